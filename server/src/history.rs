//! Tick-by-tick match recording.

use log::{debug, error, info};
use shared::{BombState, FieldState, GameHistory, PlayerHistoryEntry, TickState, Vec2};
use std::path::Path;

/// Append-only recorder for one match.
///
/// [`HistoryRecorder::finalize`] consumes the recorder, so a history is
/// produced exactly once and nothing can be appended afterwards.
#[derive(Debug)]
pub struct HistoryRecorder {
    initial_field: FieldState,
    ticks: Vec<TickState>,
}

impl HistoryRecorder {
    pub fn new(initial_field: FieldState) -> Self {
        Self {
            initial_field,
            ticks: Vec::new(),
        }
    }

    /// Stores an owned snapshot of one tick.
    pub fn record_tick(
        &mut self,
        players: Vec<PlayerHistoryEntry>,
        bombs: Vec<BombState>,
        explosions: Vec<Vec2>,
        destroyed_boxes: Vec<Vec2>,
    ) {
        self.ticks.push(TickState {
            players,
            bombs,
            explosions,
            destroyed_boxes,
        });
    }

    pub fn finalize(self, winner_auth_token: Option<String>) -> GameHistory {
        GameHistory {
            initial_field: self.initial_field,
            ticks: self.ticks,
            winner_auth_token,
        }
    }
}

/// Hands a finished history to the external consumer: a file when a path is
/// configured, the debug log otherwise. Failures are logged, never returned.
pub async fn persist(game_id: &str, history: &GameHistory, path: Option<&Path>) {
    let encoded = match serde_json::to_vec(history) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("[game {}] failed to encode history: {}", game_id, e);
            return;
        }
    };

    match path {
        Some(path) => match tokio::fs::write(path, &encoded).await {
            Ok(()) => info!(
                "[game {}] history with {} ticks written to {}",
                game_id,
                history.ticks.len(),
                path.display()
            ),
            Err(e) => error!(
                "[game {}] failed to write history to {}: {}",
                game_id,
                path.display(),
                e
            ),
        },
        None => debug!(
            "[game {}] history: {}",
            game_id,
            String::from_utf8_lossy(&encoded)
        ),
    }
}
