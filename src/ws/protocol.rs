//! WebSocket wire format
//!
//! Every frame is `{"type": "...", "data": {...}}`. Inbound frames are client
//! intents; the gateway stamps the connection's player id onto them, so the
//! payload never names a player. Outbound frames are applied server actions
//! with their `origin` tag added.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::{Action, ActionKind, Direction, PlayerId};

/// Longest display name kept from a JOIN
pub const MAX_NAME_LEN: usize = 24;

/// Frame envelope before the payload is interpreted
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinData {
    #[serde(default, alias = "playerName")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectionData {
    direction: Direction,
}

/// Errors decoding or encoding frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}

/// Decode a text frame into an intent from `player_id`.
///
/// Unknown types decode to `None`; they are not an error.
pub fn decode_intent(text: &str, player_id: PlayerId) -> Result<Option<Action>, ProtocolError> {
    let frame: RawFrame = serde_json::from_str(text)?;

    let kind = match frame.kind.as_str() {
        "JOIN" => {
            let data: JoinData = payload(&frame)?;
            ActionKind::Join {
                player_id,
                name: sanitize_name(data.name.as_deref(), player_id),
            }
        }
        "LEAVE" => ActionKind::Leave { player_id },
        "MOVE_START_REQUESTED" => {
            let data: DirectionData = payload(&frame)?;
            ActionKind::MoveStartRequested {
                player_id,
                direction: data.direction,
            }
        }
        "MOVE_STOP_REQUESTED" => {
            let data: DirectionData = payload(&frame)?;
            ActionKind::MoveStopRequested {
                player_id,
                direction: data.direction,
            }
        }
        "SHOT_REQUESTED" => ActionKind::ShotRequested { player_id },
        "DISCONNECTION_REQUESTED" => ActionKind::DisconnectionRequested { player_id },
        _ => return Ok(None),
    };

    Ok(Some(Action::client(kind)))
}

fn payload<T>(frame: &RawFrame) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if frame.data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(frame.data.clone()).map_err(|source| ProtocolError::InvalidPayload {
        kind: frame.kind.clone(),
        source,
    })
}

impl Default for DirectionData {
    fn default() -> Self {
        Self {
            direction: Direction::None,
        }
    }
}

/// Trim and bound a display name, falling back to one derived from the id
pub fn sanitize_name(raw: Option<&str>, player_id: PlayerId) -> String {
    let name: String = raw
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();

    if name.is_empty() {
        format!("Player_{}", &player_id.to_string()[..8])
    } else {
        name
    }
}

/// Encode an applied action for the wire
pub fn encode(action: &Action) -> Result<String, ProtocolError> {
    let mut value = serde_json::to_value(&action.kind)?;
    if let Value::Object(map) = &mut value {
        map.insert("origin".to_string(), serde_json::to_value(action.origin)?);
    }
    Ok(serde_json::to_string(&value)?)
}

/// Messages the gateway sends on its own behalf
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMsg {
    /// First frame on every connection
    Welcome { player_id: Uuid, server_time: u64 },
}

impl ServerMsg {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
