//! Lobby coordination and match lifecycle.
//!
//! The [`Hub`] owns every connected session. Sessions not mapped to a match
//! form the lobby; once every lobby session is ready and there are enough of
//! them, the hub launches a match and routes the participants' messages to
//! it until the match reports back through [`GameFinisher`].

use crate::classic::Classic;
use crate::config::ServerConfig;
use crate::game::{available_games, new_id, Game, GameFinisher, GameId, GameResult, Player};
use crate::session::{Session, SessionId};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use shared::{
    Envelope, ErrorPayload, GameStartPayload, LobbyUpdatePayload, MessageType, PlayerInfo,
    PlayerStatusUpdatePayload, WelcomePayload, MAX_PLAYERS, MIN_PLAYERS,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Notify, RwLock};

struct SessionEntry {
    session: Arc<Session>,
    is_ready: bool,
    score: i32,
    auth_token: Option<String>,
    /// Registration order, used to pick match participants.
    joined: u64,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    session_games: HashMap<SessionId, GameId>,
    games: HashMap<GameId, Arc<dyn Game>>,
    next_join: u64,
}

impl Registry {
    fn lobby_view(&self) -> LobbyUpdatePayload {
        let players = self
            .sessions
            .iter()
            .map(|(id, entry)| {
                let info = PlayerInfo {
                    in_game: self.session_games.contains_key(id),
                    is_ready: entry.is_ready,
                    score: entry.score,
                };
                (id.clone(), info)
            })
            .collect();
        LobbyUpdatePayload { players }
    }

    fn recipients(&self) -> Vec<Arc<Session>> {
        self.sessions.values().map(|e| Arc::clone(&e.session)).collect()
    }
}

pub struct Hub {
    me: Weak<Hub>,
    registry: RwLock<Registry>,
    config: ServerConfig,
    done: Notify,
}

impl Hub {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            registry: RwLock::new(Registry::default()),
            config,
            done: Notify::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Adds a session to the lobby and greets it with its id and the match catalogue.
    pub async fn register(&self, session: Arc<Session>) {
        let id = session.id().to_string();
        {
            let mut registry = self.registry.write().await;
            let joined = registry.next_join;
            registry.next_join += 1;
            registry.sessions.insert(
                id.clone(),
                SessionEntry {
                    session: Arc::clone(&session),
                    is_ready: false,
                    score: 0,
                    auth_token: None,
                    joined,
                },
            );
        }

        let welcome = WelcomePayload {
            client_id: id.clone(),
            current_games: available_games(),
        };
        match Envelope::new(MessageType::Welcome, &welcome) {
            Ok(envelope) => session.send(envelope),
            Err(e) => error!("session {}: failed to encode welcome: {}", id, e),
        }

        info!("session {} registered", id);
        self.broadcast_lobby().await;
    }

    /// Removes a session, pulling it out of its match first if it is in one.
    pub async fn unregister(&self, session_id: &str) {
        let game = {
            let mut registry = self.registry.write().await;
            if registry.sessions.remove(session_id).is_none() {
                return;
            }
            registry
                .session_games
                .remove(session_id)
                .and_then(|game_id| registry.games.get(&game_id).cloned())
        };

        if let Some(game) = game {
            game.remove_player(session_id).await;
        }

        info!("session {} unregistered", session_id);
        self.broadcast_lobby().await;
        self.select_and_start_game().await;
    }

    /// Routes one inbound message either to the sender's match or to the lobby.
    pub async fn dispatch(&self, session_id: &str, envelope: Envelope) {
        let target = {
            let registry = self.registry.read().await;
            if !registry.sessions.contains_key(session_id) {
                warn!("message from unknown session {}", session_id);
                return;
            }
            registry
                .session_games
                .get(session_id)
                .map(|game_id| (game_id.clone(), registry.games.get(game_id).cloned()))
        };

        match target {
            Some((_, Some(game))) => game.handle_message(session_id, envelope).await,
            Some((game_id, None)) => {
                let mut registry = self.registry.write().await;
                if registry.session_games.get(session_id) == Some(&game_id) {
                    registry.session_games.remove(session_id);
                }
                warn!(
                    "session {} mapped to missing game {}, dropping {}",
                    session_id, game_id, envelope.kind
                );
            }
            None => self.handle_lobby_message(session_id, envelope).await,
        }
    }

    async fn handle_lobby_message(&self, session_id: &str, envelope: Envelope) {
        match envelope.kind {
            MessageType::PlayerStatusUpdate => {
                let update: PlayerStatusUpdatePayload = match envelope.parse_payload() {
                    Ok(update) => update,
                    Err(e) => {
                        warn!("session {}: invalid player_status_update: {}", session_id, e);
                        self.send_error(session_id, "invalid player_status_update payload")
                            .await;
                        return;
                    }
                };

                {
                    let mut registry = self.registry.write().await;
                    let Some(entry) = registry.sessions.get_mut(session_id) else {
                        return;
                    };
                    entry.is_ready = update.is_ready;
                    entry.auth_token = update.auth_token;
                }
                debug!("session {} ready: {}", session_id, update.is_ready);

                self.broadcast_lobby().await;
                self.select_and_start_game().await;
            }
            other => warn!(
                "session {}: unexpected lobby message '{}'",
                session_id, other
            ),
        }
    }

    async fn send_error(&self, session_id: &str, message: &str) {
        let session = {
            let registry = self.registry.read().await;
            registry.sessions.get(session_id).map(|e| Arc::clone(&e.session))
        };
        let payload = ErrorPayload {
            message: message.to_string(),
        };
        if let (Some(session), Ok(envelope)) = (session, Envelope::new(MessageType::Error, &payload))
        {
            session.send(envelope);
        }
    }

    /// Starts a match when the lobby holds enough sessions and all of them are ready.
    pub async fn select_and_start_game(&self) {
        let Some(finisher) = self.me.upgrade() else {
            return;
        };

        let (game, participants) = {
            let mut registry = self.registry.write().await;

            let mut lobby: Vec<(&SessionId, &SessionEntry)> = registry
                .sessions
                .iter()
                .filter(|(id, _)| !registry.session_games.contains_key(*id))
                .collect();
            if lobby.len() < MIN_PLAYERS || !lobby.iter().all(|(_, e)| e.is_ready) {
                return;
            }
            lobby.sort_by_key(|(_, e)| e.joined);

            let chosen: Vec<(Arc<Session>, Option<String>)> = lobby
                .iter()
                .take(MAX_PLAYERS)
                .map(|(_, e)| (Arc::clone(&e.session), e.auth_token.clone()))
                .collect();

            let game_id = new_id();
            let game: Arc<dyn Game> = Arc::new(Classic::new(
                game_id.clone(),
                self.config.game.clone(),
                finisher,
            ));

            let mut participants = Vec::with_capacity(chosen.len());
            for (session, auth_token) in chosen {
                match game.add_player(session.clone(), auth_token).await {
                    Ok(()) => participants.push(session),
                    Err(e) => warn!("[game {}] {}", game_id, e),
                }
            }

            for session in &participants {
                registry
                    .session_games
                    .insert(session.id().to_string(), game_id.clone());
                if let Some(entry) = registry.sessions.get_mut(session.id()) {
                    entry.is_ready = false;
                }
            }
            registry.games.insert(game_id, Arc::clone(&game));
            (game, participants)
        };

        let info = game.info();
        info!(
            "[game {}] starting {} with {} players",
            game.id(),
            info.name,
            participants.len()
        );
        let start = GameStartPayload {
            name: info.name,
            description: info.description,
            game_id: game.id().to_string(),
        };
        match Envelope::new(MessageType::GameStart, &start) {
            Ok(envelope) => {
                for session in &participants {
                    session.send(envelope.clone());
                }
            }
            Err(e) => error!("[game {}] failed to encode game_start: {}", game.id(), e),
        }

        {
            let game = Arc::clone(&game);
            tokio::spawn(async move { game.start().await });
        }

        self.broadcast_lobby().await;
    }

    pub async fn lobby_view(&self) -> LobbyUpdatePayload {
        self.registry.read().await.lobby_view()
    }

    pub async fn active_games(&self) -> usize {
        self.registry.read().await.games.len()
    }

    pub async fn game_of(&self, session_id: &str) -> Option<GameId> {
        self.registry
            .read()
            .await
            .session_games
            .get(session_id)
            .cloned()
    }

    async fn broadcast_lobby(&self) {
        let (view, recipients) = {
            let registry = self.registry.read().await;
            (registry.lobby_view(), registry.recipients())
        };

        match Envelope::new(MessageType::UpdateLobby, &view) {
            Ok(envelope) => {
                for session in &recipients {
                    session.send(envelope.clone());
                }
            }
            Err(e) => error!("failed to encode lobby update: {}", e),
        }
    }

    /// Resolves once the first match has finished in one-shot mode.
    pub async fn wait_finished(&self) {
        self.done.notified().await;
    }
}

#[async_trait]
impl GameFinisher for Hub {
    async fn game_finished(&self, game_id: &str, result: GameResult) {
        let returning = {
            let mut registry = self.registry.write().await;
            if registry.games.remove(game_id).is_none() {
                debug!("[game {}] already released", game_id);
                return;
            }

            let members: Vec<SessionId> = registry
                .session_games
                .iter()
                .filter(|(_, mapped)| mapped.as_str() == game_id)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &members {
                registry.session_games.remove(id);
            }

            for (player_id, delta) in &result.scores {
                if let Some(entry) = registry.sessions.get_mut(player_id) {
                    entry.score += delta;
                }
            }

            members
                .iter()
                .filter_map(|id| registry.sessions.get(id))
                .map(|e| Arc::clone(&e.session))
                .collect::<Vec<_>>()
        };

        info!(
            "[game {}] released, {} players back in lobby",
            game_id,
            returning.len()
        );
        for session in &returning {
            session.send(Envelope::empty(MessageType::BackToLobby));
        }
        self.broadcast_lobby().await;

        if self.config.one_shot {
            self.done.notify_one();
            return;
        }

        if let Some(hub) = self.me.upgrade() {
            let delay = self.config.lobby_restart_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                hub.select_and_start_game().await;
            });
        }
    }
}
