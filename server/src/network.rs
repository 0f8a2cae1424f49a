//! WebSocket listener turning accepted TCP connections into hub sessions

use crate::error::ServerError;
use crate::game::Player;
use crate::hub::Hub;
use crate::session::{self, Session};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Accept loop in front of a [`Hub`]
pub struct Server {
    listener: TcpListener,
    hub: Arc<Hub>,
}

impl Server {
    pub async fn bind(addr: &str, hub: Arc<Hub>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever; each one is served on its own task.
    pub async fn run(&self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let hub = Arc::clone(&self.hub);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(hub, stream, peer).await {
                    error!("Connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    hub: Arc<Hub>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ServerError> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let config = hub.config().session.clone();
    let (session, outbound) = Session::new(config.send_queue_capacity);
    info!("session {} connected from {}", session.id(), peer);

    hub.register(Arc::clone(&session)).await;
    session::serve(hub, session, outbound, socket, config).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use futures_util::StreamExt;
    use shared::{Envelope, MessageType};
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let hub = Hub::new(ServerConfig::default());
        let server = Server::bind("127.0.0.1:0", hub).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_connection_receives_welcome() {
        let hub = Hub::new(ServerConfig::default());
        let server = Server::bind("127.0.0.1:0", Arc::clone(&hub)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move { server.run().await });

        let (mut socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let frame = socket.next().await.unwrap().unwrap();
        let envelope: Envelope = serde_json::from_str(frame.to_text().unwrap()).unwrap();

        assert_eq!(envelope.kind, MessageType::Welcome);
        assert_eq!(hub.lobby_view().await.players.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_tcp_client_fails_handshake() {
        let hub = Hub::new(ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            drop(stream);
        });
        let (stream, peer) = listener.accept().await.unwrap();
        client.await.unwrap();

        let result = handle_connection(Arc::clone(&hub), stream, peer).await;
        assert!(matches!(result, Err(ServerError::Handshake(_))));
        assert!(hub.lobby_view().await.players.is_empty());
    }
}
