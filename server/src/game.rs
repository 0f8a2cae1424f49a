//! Contracts between the hub, connected players and running matches.
//!
//! The hub only talks to matches through [`Game`], matches only talk back
//! through [`GameFinisher`] and address participants through [`Player`].
//! Classic is the single match type today; new variants plug in here.

use crate::error::GameError;
use async_trait::async_trait;
use shared::{Envelope, GameInfo};
use std::collections::HashMap;
use std::sync::Arc;

pub type PlayerId = String;
pub type GameId = String;

/// Addressable participant, implemented by client sessions.
pub trait Player: Send + Sync {
    fn id(&self) -> &str;

    /// Queues a message for delivery. Never blocks; may drop when the
    /// participant is not keeping up.
    fn send(&self, envelope: Envelope);
}

/// Outcome reported once per match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameResult {
    /// `None` for a draw.
    pub winner: Option<PlayerId>,
    /// Score delta per player.
    pub scores: HashMap<PlayerId, i32>,
}

/// Callback a match uses to hand its result back to whoever launched it.
#[async_trait]
pub trait GameFinisher: Send + Sync {
    async fn game_finished(&self, game_id: &str, result: GameResult);
}

#[async_trait]
pub trait Game: Send + Sync {
    fn id(&self) -> &str;

    fn info(&self) -> GameInfo;

    async fn add_player(
        &self,
        player: Arc<dyn Player>,
        auth_token: Option<String>,
    ) -> Result<(), GameError>;

    /// Removes a participant; may end a running match that drops below its
    /// minimum player count.
    async fn remove_player(&self, player_id: &str);

    async fn handle_message(&self, player_id: &str, envelope: Envelope);

    /// Runs the match until it finishes. Intended to be spawned as its own task.
    async fn start(&self);

    /// Ends the match and delivers its result. Only the first call has an effect.
    async fn stop(&self);
}

/// Random 64-bit identifier rendered as 16 hex digits, used for sessions and games.
pub fn new_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Match types offered to clients in the welcome message.
pub fn available_games() -> Vec<GameInfo> {
    vec![crate::classic::Classic::game_info()]
}
