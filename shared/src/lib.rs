use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;
use std::time::Duration;

pub const FIELD_WIDTH: i32 = 11;
pub const FIELD_HEIGHT: i32 = 11;
pub const FUSE_TICKS: i32 = 10;
/// Cells covered beyond the bomb's own cell in each direction.
pub const EXPLOSION_REACH: i32 = 2;
pub const TICK_PERIOD: Duration = Duration::from_millis(200);
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;
pub const INITIAL_HEALTH: i32 = 3;
pub const WIN_SCORE_POINTS: i32 = 250;
pub const MAX_GAME_DURATION: Duration = Duration::from_secs(180);

/// Spawn cells handed out in join order: top-left, top-right, bottom-left, bottom-right.
pub const SPAWN_CORNERS: [Vec2; MAX_PLAYERS] = [
    Vec2::new(1, 1),
    Vec2::new(FIELD_WIDTH - 2, 1),
    Vec2::new(1, FIELD_HEIGHT - 2),
    Vec2::new(FIELD_WIDTH - 2, FIELD_HEIGHT - 2),
];

/// Integer grid coordinate. `y` grows downwards.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const UP: Vec2 = Vec2::new(0, -1);
    pub const RIGHT: Vec2 = Vec2::new(1, 0);
    pub const DOWN: Vec2 = Vec2::new(0, 1);
    pub const LEFT: Vec2 = Vec2::new(-1, 0);

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn scale(self, factor: i32) -> Vec2 {
        Vec2::new(self.x * factor, self.y * factor)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tile {
    #[default]
    Air,
    Wall,
    Box,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMove {
    Nothing,
    MoveUp,
    MoveRight,
    MoveDown,
    MoveLeft,
    PlaceBomb,
}

impl PlayerMove {
    /// Direction of a movement input, `None` for non-movement inputs.
    pub fn direction(self) -> Option<Vec2> {
        match self {
            PlayerMove::MoveUp => Some(Vec2::UP),
            PlayerMove::MoveRight => Some(Vec2::RIGHT),
            PlayerMove::MoveDown => Some(Vec2::DOWN),
            PlayerMove::MoveLeft => Some(Vec2::LEFT),
            PlayerMove::Nothing | PlayerMove::PlaceBomb => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Welcome,
    BackToLobby,
    UpdateLobby,
    PlayerStatusUpdate,
    Error,
    GameStart,
    ClassicInput,
    ClassicState,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Welcome => "welcome",
            MessageType::BackToLobby => "back_to_lobby",
            MessageType::UpdateLobby => "update_lobby",
            MessageType::PlayerStatusUpdate => "player_status_update",
            MessageType::Error => "error",
            MessageType::GameStart => "game_start",
            MessageType::ClassicInput => "classic_input",
            MessageType::ClassicState => "classic_state",
        };
        f.write_str(name)
    }
}

/// Wire envelope shared by every message in both directions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(kind: MessageType, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            kind,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Envelope carrying a `null` payload, e.g. `back_to_lobby`.
    pub fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            payload: serde_json::Value::Null,
        }
    }

    pub fn parse_payload<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub client_id: String,
    pub current_games: Vec<GameInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub in_game: bool,
    pub is_ready: bool,
    pub score: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LobbyUpdatePayload {
    pub players: BTreeMap<String, PlayerInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatusUpdatePayload {
    pub is_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorPayload {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GameStartPayload {
    pub name: String,
    pub description: String,
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ClassicInputPayload {
    #[serde(rename = "move")]
    pub player_move: PlayerMove,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub id: String,
    pub pos: Vec2,
    pub health: i32,
    pub score: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldState {
    pub width: i32,
    pub height: i32,
    /// Row-major tiles, `index = y * width + x`.
    pub field: Vec<Tile>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BombState {
    pub pos: Vec2,
    pub fuse: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClassicStatePayload {
    pub players: Vec<PlayerState>,
    pub field: FieldState,
    pub bombs: Vec<BombState>,
    pub explosions: Vec<Vec2>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerHistoryEntry {
    #[serde(flatten)]
    pub state: PlayerState,
    /// Input applied during the tick; `None` when the player sent nothing.
    #[serde(rename = "move")]
    pub player_move: Option<PlayerMove>,
    #[serde(rename = "authToken")]
    pub auth_token: Option<String>,
}

/// Dynamic state of one tick as stored in a match history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TickState {
    pub players: Vec<PlayerHistoryEntry>,
    pub bombs: Vec<BombState>,
    pub explosions: Vec<Vec2>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destroyed_boxes: Vec<Vec2>,
}

/// Finalized record of a whole match, consumed by the match orchestrator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameHistory {
    pub initial_field: FieldState,
    pub ticks: Vec<TickState>,
    #[serde(rename = "winnerAuthToken")]
    pub winner_auth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spawn_corners_are_inside_the_border() {
        for corner in SPAWN_CORNERS {
            assert!(corner.x > 0 && corner.x < FIELD_WIDTH - 1);
            assert!(corner.y > 0 && corner.y < FIELD_HEIGHT - 1);
        }
        assert_eq!(SPAWN_CORNERS[1], Vec2::new(9, 1));
        assert_eq!(SPAWN_CORNERS[2], Vec2::new(1, 9));
    }

    #[test]
    fn test_vec2_arithmetic() {
        let pos = Vec2::new(3, 4);
        assert_eq!(pos + Vec2::UP, Vec2::new(3, 3));
        assert_eq!(pos + Vec2::LEFT.scale(2), Vec2::new(1, 4));
        assert_eq!(pos.to_string(), "(3, 4)");
    }

    #[test]
    fn test_move_directions() {
        assert_eq!(PlayerMove::MoveDown.direction(), Some(Vec2::DOWN));
        assert_eq!(PlayerMove::PlaceBomb.direction(), None);
        assert_eq!(PlayerMove::Nothing.direction(), None);
    }

    #[test]
    fn test_tile_and_move_wire_names() {
        assert_eq!(serde_json::to_value(Tile::Wall).unwrap(), json!("WALL"));
        assert_eq!(serde_json::to_value(Tile::Air).unwrap(), json!("AIR"));
        assert_eq!(
            serde_json::to_value(PlayerMove::PlaceBomb).unwrap(),
            json!("place_bomb")
        );
        assert_eq!(
            serde_json::to_value(MessageType::BackToLobby).unwrap(),
            json!("back_to_lobby")
        );
        assert_eq!(MessageType::ClassicState.to_string(), "classic_state");
    }

    #[test]
    fn test_envelope_decodes_classic_input() {
        let raw = r#"{"type":"classic_input","payload":{"move":"move_left"}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();

        assert_eq!(envelope.kind, MessageType::ClassicInput);
        let input: ClassicInputPayload = envelope.parse_payload().unwrap();
        assert_eq!(input.player_move, PlayerMove::MoveLeft);
    }

    #[test]
    fn test_envelope_rejects_unknown_type() {
        let raw = r#"{"type":"teleport","payload":{}}"#;
        assert!(serde_json::from_str::<Envelope>(raw).is_err());
    }

    #[test]
    fn test_empty_envelope_has_null_payload() {
        let envelope = Envelope::empty(MessageType::BackToLobby);
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(encoded, json!({"type": "back_to_lobby", "payload": null}));
    }

    #[test]
    fn test_status_update_without_auth_token() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"player_status_update","payload":{"isReady":true}}"#)
                .unwrap();
        let status: PlayerStatusUpdatePayload = envelope.parse_payload().unwrap();
        assert!(status.is_ready);
        assert_eq!(status.auth_token, None);
    }

    #[test]
    fn test_history_entry_flattens_player_state() {
        let entry = PlayerHistoryEntry {
            state: PlayerState {
                id: "abc".to_string(),
                pos: Vec2::new(1, 1),
                health: 3,
                score: 0,
            },
            player_move: Some(PlayerMove::MoveUp),
            auth_token: Some("token".to_string()),
        };

        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": "abc",
                "pos": {"x": 1, "y": 1},
                "health": 3,
                "score": 0,
                "move": "move_up",
                "authToken": "token"
            })
        );
    }

    #[test]
    fn test_tick_state_omits_empty_destroyed_boxes() {
        let tick = TickState {
            players: vec![],
            bombs: vec![BombState {
                pos: Vec2::new(1, 1),
                fuse: 9,
            }],
            explosions: vec![],
            destroyed_boxes: vec![],
        };

        let encoded = serde_json::to_value(&tick).unwrap();
        assert!(encoded.get("destroyed_boxes").is_none());
        assert_eq!(encoded["bombs"][0]["fuse"], json!(9));
    }
}
