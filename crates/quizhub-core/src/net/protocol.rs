use serde::Serialize;

use super::messages::{ClientMessage, ServerMessage};
use crate::room::Room;

/// Default cap on an inbound frame, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Longest accepted user, team, or button id, in bytes.
pub const MAX_ID_LEN: usize = 64;

/// Longest accepted nickname or team name, in characters.
pub const MAX_NAME_LEN: usize = 32;

#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    EmptyMessage,
    PayloadTooLarge { size: usize, max: usize },
    SerializeError(String),
    DeserializeError(String),
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {size} bytes (max {max})")
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
            Self::InvalidField { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a `ServerMessage` as a JSON text frame.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Borrowed form of the full-room frames, so a snapshot can be encoded
/// under the room lock without cloning the room.
#[derive(Serialize)]
struct RoomFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Room,
}

fn encode_room_frame(kind: &'static str, room: &Room) -> Result<String, ProtocolError> {
    serde_json::to_string(&RoomFrame { kind, data: room })
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Encode a `state` frame. Same bytes as `ServerMessage::State`.
pub fn encode_state(room: &Room) -> Result<String, ProtocolError> {
    encode_room_frame("state", room)
}

/// Encode a `join_success` frame. Same bytes as `ServerMessage::JoinSuccess`.
pub fn encode_join_success(room: &Room) -> Result<String, ProtocolError> {
    encode_room_frame("join_success", room)
}

/// Encode a `ClientMessage` as a JSON text frame.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Decode a server frame. Used by clients and tests.
pub fn decode_server_message(data: &str) -> Result<ServerMessage, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    serde_json::from_str(data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode and validate a client frame against [`MAX_MESSAGE_SIZE`].
pub fn decode_client_message(data: &str) -> Result<ClientMessage, ProtocolError> {
    decode_client_message_with_limit(data, MAX_MESSAGE_SIZE)
}

/// Decode and validate a client frame of at most `max` bytes.
///
/// Names are returned trimmed. Ids are taken verbatim.
pub fn decode_client_message_with_limit(
    data: &str,
    max: usize,
) -> Result<ClientMessage, ProtocolError> {
    if data.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > max {
        return Err(ProtocolError::PayloadTooLarge {
            size: data.len(),
            max,
        });
    }
    let mut msg: ClientMessage =
        serde_json::from_str(data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))?;
    validate(&mut msg)?;
    Ok(msg)
}

fn validate(msg: &mut ClientMessage) -> Result<(), ProtocolError> {
    match msg {
        ClientMessage::CreateRoom(_) | ClientMessage::AdminAuth(_) => {},
        ClientMessage::Join(m) => {
            check_id("userId", &m.user_id)?;
            check_optional_id("buttonId", &m.button_id)?;
            m.nickname = clean_name("nickname", &m.nickname)?;
        },
        ClientMessage::JoinTeam(m) => {
            check_id("userId", &m.user_id)?;
            check_id("teamId", &m.team_id)?;
            m.nickname = clean_name("nickname", &m.nickname)?;
        },
        ClientMessage::CreateTeam(m) => {
            m.team_name = clean_name("teamName", &m.team_name)?;
            if m.team_color.chars().count() > MAX_NAME_LEN
                || m.team_color.chars().any(char::is_control)
            {
                return Err(ProtocolError::InvalidField {
                    field: "teamColor",
                    reason: "too long or contains control characters",
                });
            }
        },
        ClientMessage::Click(m) => {
            check_id("userId", &m.user_id)?;
            check_optional_id("buttonId", &m.button_id)?;
        },
        ClientMessage::HostSetState(_) => {},
    }
    Ok(())
}

fn check_id(field: &'static str, id: &str) -> Result<(), ProtocolError> {
    if id.is_empty() {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    check_optional_id(field, id)
}

fn check_optional_id(field: &'static str, id: &str) -> Result<(), ProtocolError> {
    if id.len() > MAX_ID_LEN {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "too long",
        });
    }
    if id.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "contains control characters",
        });
    }
    Ok(())
}

fn clean_name(field: &'static str, name: &str) -> Result<String, ProtocolError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "too long",
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "contains control characters",
        });
    }
    Ok(name.to_string())
}
