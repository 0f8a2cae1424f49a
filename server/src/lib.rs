//! # Bomberman Session Server
//!
//! Authoritative server for real-time Bomberman matches played over
//! WebSockets. Clients connect, gather in a lobby, mark themselves ready and
//! are moved into isolated matches that simulate the arena on a fixed tick.
//!
//! ## Architecture
//!
//! ### Hub (`hub`)
//! Single coordinator of every connected session. Keeps the lobby view,
//! decides when a match can start, routes inbound messages to the owning
//! match and takes participants back once the match reports its result.
//!
//! ### Sessions (`session`, `network`)
//! One WebSocket connection each, served by an inbound and an outbound pump.
//! Outbound delivery goes through a bounded queue and never blocks the
//! sender; a full queue drops messages.
//!
//! ### Matches (`game`, `classic`, `arena`, `history`)
//! `game` defines the contracts between hub, players and matches. `classic`
//! is the only match type: an 11x11 arena where bombs detonate after a fixed
//! fuse, blasts travel two cells and chain into other bombs within the same
//! tick. Every tick is recorded and the finished history is handed to an
//! external consumer.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::hub::Hub;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Hub::new(ServerConfig::default());
//!     let server = Server::bind("127.0.0.1:8038", hub).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod classic;
pub mod config;
pub mod error;
pub mod game;
pub mod history;
pub mod hub;
pub mod network;
pub mod session;
