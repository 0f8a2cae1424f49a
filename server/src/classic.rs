//! Classic match: fixed-tick grid simulation with bombs and chain reactions.
//!
//! [`ClassicState`] is the pure simulation. It has no clock and no I/O, so a
//! given sequence of inputs always produces the same sequence of states.
//! [`Classic`] wraps it in a lock, drives it from a tick timer and talks to
//! the players and to the hub.

use crate::arena::Field;
use crate::config::MatchConfig;
use crate::error::GameError;
use crate::game::{Game, GameFinisher, GameId, GameResult, Player, PlayerId};
use crate::history::{self, HistoryRecorder};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use shared::{
    BombState, ClassicInputPayload, ClassicStatePayload, Envelope, GameHistory, GameInfo,
    MessageType, PlayerHistoryEntry, PlayerMove, PlayerState, Tile, Vec2, EXPLOSION_REACH,
    FUSE_TICKS, INITIAL_HEALTH, MAX_PLAYERS, MIN_PLAYERS, SPAWN_CORNERS, WIN_SCORE_POINTS,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, sleep, MissedTickBehavior};

const DIRECTIONS: [Vec2; 4] = [Vec2::UP, Vec2::RIGHT, Vec2::DOWN, Vec2::LEFT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bomb {
    pub pos: Vec2,
    /// Ticks left until detonation.
    pub fuse: i32,
}

impl Bomb {
    pub fn new(pos: Vec2) -> Self {
        Self {
            pos,
            fuse: FUSE_TICKS,
        }
    }
}

/// Progress of one bomb's blast: the beam direction and cell it reached.
struct Blast {
    center: Vec2,
    dir: usize,
    step: i32,
}

impl Blast {
    fn at(center: Vec2) -> Self {
        Self {
            center,
            dir: 0,
            step: 0,
        }
    }
}

/// In-match state of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicPlayer {
    pub id: PlayerId,
    pub pos: Vec2,
    pub health: i32,
    pub score: i32,
    pub auth_token: Option<String>,
    /// Input buffered for the next tick, cleared once applied.
    pub next_move: Option<PlayerMove>,
}

impl ClassicPlayer {
    fn to_state(&self) -> PlayerState {
        PlayerState {
            id: self.id.clone(),
            pos: self.pos,
            health: self.health,
            score: self.score,
        }
    }
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub state: ClassicStatePayload,
    pub destroyed_boxes: Vec<Vec2>,
    pub game_over: bool,
}

pub struct ClassicState {
    game_id: GameId,
    phase: Phase,
    field: Field,
    players: BTreeMap<PlayerId, ClassicPlayer>,
    bombs: BTreeMap<Vec2, Bomb>,
    explosions: BTreeSet<Vec2>,
    history: Option<HistoryRecorder>,
    timed_out: bool,
    /// Set once the match enters `Running`; a match that never ran is a draw.
    started: bool,
    tick: u64,
}

impl ClassicState {
    pub fn new(game_id: impl Into<GameId>) -> Self {
        let field = Field::new();
        let history = HistoryRecorder::new(field.to_state());
        Self {
            game_id: game_id.into(),
            phase: Phase::Created,
            field,
            players: BTreeMap::new(),
            bombs: BTreeMap::new(),
            explosions: BTreeSet::new(),
            history: Some(history),
            timed_out: false,
            started: false,
            tick: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: &str) -> Option<&ClassicPlayer> {
        self.players.get(id)
    }

    pub fn explosions(&self) -> &BTreeSet<Vec2> {
        &self.explosions
    }

    /// Adds a participant at the first free spawn corner and returns that corner.
    ///
    /// Fails without touching the state when the match is full, already
    /// contains the id, or has left the `Created` phase.
    pub fn add_player(
        &mut self,
        id: &str,
        auth_token: Option<String>,
    ) -> Result<Vec2, GameError> {
        if self.phase != Phase::Created {
            return Err(GameError::NotJoinable(self.game_id.clone()));
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::Full {
                game_id: self.game_id.clone(),
                current: self.players.len(),
                max: MAX_PLAYERS,
            });
        }
        if self.players.contains_key(id) {
            return Err(GameError::DuplicatePlayer {
                game_id: self.game_id.clone(),
                player_id: id.to_string(),
            });
        }

        let spawn = SPAWN_CORNERS
            .iter()
            .copied()
            .find(|corner| self.players.values().all(|p| p.pos != *corner))
            .unwrap_or(SPAWN_CORNERS[0]);

        self.players.insert(
            id.to_string(),
            ClassicPlayer {
                id: id.to_string(),
                pos: spawn,
                health: INITIAL_HEALTH,
                score: 0,
                auth_token,
                next_move: None,
            },
        );
        Ok(spawn)
    }

    pub fn remove_player(&mut self, id: &str) -> bool {
        self.players.remove(id).is_some()
    }

    /// Buffers the input for the next tick, replacing any earlier one.
    pub fn set_next_move(&mut self, id: &str, player_move: PlayerMove) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.next_move = Some(player_move);
                true
            }
            None => false,
        }
    }

    pub fn begin(&mut self) {
        if self.phase == Phase::Created {
            self.phase = Phase::Running;
            self.started = true;
        }
    }

    pub fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) -> TickReport {
        self.tick += 1;
        self.apply_player_input();
        self.explosions.clear();
        let destroyed_boxes = self.update_bombs();
        self.damage_players_in_explosions();

        let state = self.snapshot();
        if let Some(history) = self.history.as_mut() {
            let players = self
                .players
                .values()
                .map(|p| PlayerHistoryEntry {
                    state: p.to_state(),
                    player_move: p.next_move,
                    auth_token: p.auth_token.clone(),
                })
                .collect();
            history.record_tick(
                players,
                state.bombs.clone(),
                state.explosions.clone(),
                destroyed_boxes.clone(),
            );
        }

        for player in self.players.values_mut() {
            player.next_move = None;
        }

        TickReport {
            state,
            destroyed_boxes,
            game_over: self.is_game_over(),
        }
    }

    fn apply_player_input(&mut self) {
        for player in self.players.values_mut() {
            match player.next_move {
                Some(PlayerMove::PlaceBomb) => {
                    self.bombs
                        .entry(player.pos)
                        .or_insert_with(|| Bomb::new(player.pos));
                }
                Some(other) => {
                    // Bomb cells stay walkable.
                    if let Some(dir) = other.direction() {
                        let target = player.pos + dir;
                        if !self.field.is_blocked(target) {
                            player.pos = target;
                        }
                    }
                }
                None => {}
            }
        }
    }

    fn update_bombs(&mut self) -> Vec<Vec2> {
        let mut destroyed = Vec::new();
        let positions: Vec<Vec2> = self.bombs.keys().copied().collect();

        for pos in positions {
            // Already consumed by a chain reaction earlier this tick.
            let Some(bomb) = self.bombs.get_mut(&pos) else {
                continue;
            };
            bomb.fuse -= 1;
            if bomb.fuse <= 0 {
                self.bombs.remove(&pos);
                destroyed.extend(self.detonate(pos));
            }
        }
        destroyed
    }

    /// Casts the blast of a bomb already removed from the live set, including
    /// every bomb it sets off. Returns the boxes it destroyed.
    ///
    /// A bomb hit by a beam blasts fully before that beam moves on.
    fn detonate(&mut self, origin: Vec2) -> Vec<Vec2> {
        let mut destroyed = Vec::new();
        let mut stack = vec![Blast::at(origin)];

        while let Some(blast) = stack.last_mut() {
            let Some(&dir) = DIRECTIONS.get(blast.dir) else {
                stack.pop();
                continue;
            };
            let cell = blast.center + dir.scale(blast.step);

            let (beam_ends, chained) = match self.field.get(cell) {
                Tile::Wall => (true, false),
                Tile::Box => {
                    self.field.set(cell, Tile::Air);
                    self.explosions.insert(cell);
                    destroyed.push(cell);
                    (true, false)
                }
                Tile::Air => {
                    self.explosions.insert(cell);
                    // Removed before it blasts, so it can never be triggered twice.
                    (false, self.bombs.remove(&cell).is_some())
                }
            };

            if beam_ends || blast.step >= EXPLOSION_REACH {
                blast.dir += 1;
                blast.step = 0;
            } else {
                blast.step += 1;
            }
            if chained {
                stack.push(Blast::at(cell));
            }
        }
        destroyed
    }

    fn damage_players_in_explosions(&mut self) {
        for player in self.players.values_mut() {
            if self.explosions.contains(&player.pos) {
                player.health -= 1;
            }
        }
    }

    pub fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.health > 0).count()
    }

    pub fn is_game_over(&self) -> bool {
        self.alive_count() <= 1
    }

    pub fn snapshot(&self) -> ClassicStatePayload {
        ClassicStatePayload {
            players: self.players.values().map(ClassicPlayer::to_state).collect(),
            field: self.field.to_state(),
            bombs: self
                .bombs
                .values()
                .map(|b| BombState {
                    pos: b.pos,
                    fuse: b.fuse,
                })
                .collect(),
            explosions: self.explosions.iter().copied().collect(),
        }
    }

    fn winner(&self) -> Option<&ClassicPlayer> {
        if !self.started {
            None
        } else if self.timed_out {
            let best = self.players.values().map(|p| p.health).max()?;
            unique(self.players.values().filter(|p| p.health == best))
        } else {
            unique(self.players.values().filter(|p| p.health > 0))
        }
    }

    pub fn result(&self) -> GameResult {
        let mut result = GameResult::default();
        if let Some(winner) = self.winner() {
            result.winner = Some(winner.id.clone());
            result.scores.insert(winner.id.clone(), WIN_SCORE_POINTS);
        }
        result
    }

    /// Moves to `Finished` and yields the result and history. Returns `None`
    /// when the match had already finished.
    pub fn finish(&mut self) -> Option<(GameResult, GameHistory)> {
        if self.phase == Phase::Finished {
            return None;
        }
        self.phase = Phase::Finished;

        let result = self.result();
        let winner_token = result
            .winner
            .as_ref()
            .and_then(|id| self.players.get(id))
            .and_then(|p| p.auth_token.clone());
        let history = self
            .history
            .take()
            .map(|h| h.finalize(winner_token.clone()))
            .unwrap_or_else(|| GameHistory {
                initial_field: self.field.to_state(),
                ticks: Vec::new(),
                winner_auth_token: winner_token,
            });
        Some((result, history))
    }
}

fn unique<'a>(mut candidates: impl Iterator<Item = &'a ClassicPlayer>) -> Option<&'a ClassicPlayer> {
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

struct Inner {
    sim: ClassicState,
    participants: HashMap<PlayerId, Arc<dyn Player>>,
}

pub struct Classic {
    id: GameId,
    config: MatchConfig,
    finisher: Arc<dyn GameFinisher>,
    inner: Mutex<Inner>,
    stop_signal: Notify,
}

impl Classic {
    pub fn new(id: impl Into<GameId>, config: MatchConfig, finisher: Arc<dyn GameFinisher>) -> Self {
        let id = id.into();
        Self {
            inner: Mutex::new(Inner {
                sim: ClassicState::new(id.clone()),
                participants: HashMap::new(),
            }),
            id,
            config,
            finisher,
            stop_signal: Notify::new(),
        }
    }

    pub fn game_info() -> GameInfo {
        GameInfo {
            name: "Classic".to_string(),
            description: "The classic and simple bomberman game!".to_string(),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.sim.phase()
    }

    /// Runs one tick and broadcasts the new state. Returns `true` once the
    /// loop should end.
    async fn run_tick(&self) -> bool {
        let (report, recipients) = {
            let mut inner = self.inner.lock().await;
            if inner.sim.phase() != Phase::Running {
                return true;
            }
            let report = inner.sim.step();
            let recipients: Vec<Arc<dyn Player>> = inner.participants.values().cloned().collect();
            (report, recipients)
        };

        match Envelope::new(MessageType::ClassicState, &report.state) {
            Ok(envelope) => {
                for player in &recipients {
                    player.send(envelope.clone());
                }
            }
            Err(e) => error!("[game {}] failed to encode state: {}", self.id, e),
        }

        if !report.destroyed_boxes.is_empty() {
            debug!(
                "[game {}] {} boxes destroyed",
                self.id,
                report.destroyed_boxes.len()
            );
        }
        report.game_over
    }
}

#[async_trait]
impl Game for Classic {
    fn id(&self) -> &str {
        &self.id
    }

    fn info(&self) -> GameInfo {
        Self::game_info()
    }

    async fn add_player(
        &self,
        player: Arc<dyn Player>,
        auth_token: Option<String>,
    ) -> Result<(), GameError> {
        let mut inner = self.inner.lock().await;
        let player_id = player.id().to_string();
        let spawn = inner.sim.add_player(&player_id, auth_token)?;
        inner.participants.insert(player_id.clone(), player);
        info!("[game {}] player {} added at {}", self.id, player_id, spawn);
        Ok(())
    }

    async fn remove_player(&self, player_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.participants.remove(player_id);
        if !inner.sim.remove_player(player_id) {
            return;
        }
        info!("[game {}] player {} removed", self.id, player_id);

        let remaining = inner.sim.player_count();
        if inner.sim.phase() == Phase::Running && remaining < MIN_PLAYERS {
            warn!(
                "[game {}] not enough players remaining ({}/{}), stopping",
                self.id, remaining, MIN_PLAYERS
            );
            self.stop_signal.notify_one();
        }
    }

    async fn handle_message(&self, player_id: &str, envelope: Envelope) {
        match envelope.kind {
            MessageType::ClassicInput => {
                let input: ClassicInputPayload = match envelope.parse_payload() {
                    Ok(input) => input,
                    Err(e) => {
                        warn!(
                            "[game {}] invalid classic_input from {}: {}",
                            self.id, player_id, e
                        );
                        return;
                    }
                };
                let mut inner = self.inner.lock().await;
                if !inner.sim.set_next_move(player_id, input.player_move) {
                    warn!(
                        "[game {}] input from {} who is not part of this game",
                        self.id, player_id
                    );
                }
            }
            other => warn!(
                "[game {}] unhandled message type '{}' from {}",
                self.id, other, player_id
            ),
        }
    }

    async fn start(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.sim.phase() != Phase::Created {
                warn!("[game {}] start called twice", self.id);
                return;
            }
            let count = inner.sim.player_count();
            if count < MIN_PLAYERS {
                drop(inner);
                warn!(
                    "[game {}] cannot start, not enough players ({}/{})",
                    self.id, count, MIN_PLAYERS
                );
                self.stop().await;
                return;
            }
            inner.sim.begin();
        }

        info!("[game {}] starting game loop", self.id);
        let mut ticker = interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        let deadline = sleep(self.config.max_duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.run_tick().await {
                        break;
                    }
                }
                _ = &mut deadline => {
                    info!("[game {}] maximum duration reached", self.id);
                    self.inner.lock().await.sim.mark_timed_out();
                    break;
                }
                _ = self.stop_signal.notified() => break,
            }
        }

        self.stop().await;
        info!("[game {}] game loop stopped", self.id);
    }

    async fn stop(&self) {
        let finished = {
            let mut inner = self.inner.lock().await;
            let ticks = inner.sim.tick_count();
            inner.sim.finish().map(|outcome| (outcome, ticks))
        };
        let Some(((result, history), ticks)) = finished else {
            return;
        };
        self.stop_signal.notify_one();

        match &result.winner {
            Some(winner) => info!(
                "[game {}] finished after {} ticks, winner {}",
                self.id, ticks, winner
            ),
            None => info!("[game {}] finished after {} ticks as a draw", self.id, ticks),
        }

        history::persist(&self.id, &history, self.config.history_path.as_deref()).await;
        self.finisher.game_finished(&self.id, result).await;
    }
}
