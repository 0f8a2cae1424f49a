use thiserror::Error;

/// Capacity and state errors reported back to the hub by a match.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game {game_id} is full ({current}/{max} players)")]
    Full {
        game_id: String,
        current: usize,
        max: usize,
    },
    #[error("player {player_id} already joined game {game_id}")]
    DuplicatePlayer { game_id: String, player_id: String },
    #[error("game {0} is no longer accepting players")]
    NotJoinable(String),
}

/// Transport failures that end a client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("no frame received within {0:?}")]
    ReadTimeout(std::time::Duration),
    #[error("write did not complete within {0:?}")]
    WriteTimeout(std::time::Duration),
    #[error("inbound frame of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}
