//! Runtime configuration shared by the hub, sessions and matches.
//!
//! The defaults reproduce the fixed protocol constants; the binary only
//! overrides what its command line exposes.

use shared::{MAX_GAME_DURATION, TICK_PERIOD};
use std::path::PathBuf;
use std::time::Duration;

/// Per-connection pump settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the outbound queue; messages beyond it are dropped.
    pub send_queue_capacity: usize,
    /// Idle interval after which a heartbeat ping is written.
    pub heartbeat_interval: Duration,
    /// Time without any inbound frame before the connection is considered dead.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Largest inbound text frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let read_timeout = Duration::from_secs(60);
        Self {
            send_queue_capacity: 256,
            heartbeat_interval: read_timeout * 9 / 10,
            read_timeout,
            write_timeout: Duration::from_secs(10),
            max_message_size: 1024,
        }
    }
}

/// Per-match timing and history output.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub tick_period: Duration,
    /// Ceiling after which the match ends and health decides the winner.
    pub max_duration: Duration,
    /// File receiving the finished match history; logged when unset.
    pub history_path: Option<PathBuf>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_period: TICK_PERIOD,
            max_duration: MAX_GAME_DURATION,
            history_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub session: SessionConfig,
    pub game: MatchConfig,
    /// Pause between a match ending and the next start attempt.
    pub lobby_restart_delay: Duration,
    /// Finish the hub after its first match.
    pub one_shot: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            game: MatchConfig::default(),
            lobby_restart_delay: Duration::from_millis(500),
            one_shot: false,
        }
    }
}
