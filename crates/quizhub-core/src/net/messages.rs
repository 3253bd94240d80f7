use serde::{Deserialize, Serialize};

use crate::player::{Player, UserId};
use crate::room::{Phase, Room};
use crate::team::{Team, TeamId};
use crate::time::Timestamp;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Every inbound event. The `type` field selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom(CreateRoomMsg),
    AdminAuth(AdminAuthMsg),
    Join(JoinMsg),
    JoinTeam(JoinTeamMsg),
    CreateTeam(CreateTeamMsg),
    Click(ClickMsg),
    HostSetState(HostSetStateMsg),
}

impl ClientMessage {
    /// Wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create_room",
            Self::AdminAuth(_) => "admin_auth",
            Self::Join(_) => "join",
            Self::JoinTeam(_) => "join_team",
            Self::CreateTeam(_) => "create_team",
            Self::Click(_) => "click",
            Self::HostSetState(_) => "host_set_state",
        }
    }

    /// Room explicitly addressed by this message, if any. An empty `quizId`
    /// counts as absent.
    pub fn target_room(&self) -> Option<&str> {
        let quiz_id = match self {
            Self::CreateRoom(_) => None,
            Self::AdminAuth(m) => Some(m.room_code.as_str()),
            Self::Join(m) => m.quiz_id.as_deref(),
            Self::JoinTeam(m) => m.quiz_id.as_deref(),
            Self::CreateTeam(m) => m.quiz_id.as_deref(),
            Self::Click(m) => m.quiz_id.as_deref(),
            Self::HostSetState(m) => m.quiz_id.as_deref(),
        };
        quiz_id.filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAuthMsg {
    pub room_code: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    pub user_id: UserId,
    #[serde(default)]
    pub button_id: String,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeamMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    pub user_id: UserId,
    pub team_id: TeamId,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    pub team_name: String,
    #[serde(default)]
    pub team_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    pub user_id: UserId,
    #[serde(default)]
    pub button_id: String,
    /// Client-side click time. Informational only; the hub stamps its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_client: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSetStateMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    pub phase: Phase,
    #[serde(default)]
    pub delay_ms: u64,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Every outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated(RoomCreatedMsg),
    JoinSuccess(RoomSnapshotMsg),
    JoinError(ErrorMsg),
    State(RoomSnapshotMsg),
    PlayerJoined(PlayerJoinedMsg),
    TeamCreated(TeamCreatedMsg),
    TeamJoined(TeamJoinedMsg),
    StartQuestion(QuestionSignalMsg),
    NextQuestion(QuestionSignalMsg),
    Error(ErrorMsg),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedMsg {
    pub data: Room,
    pub admin_token: String,
}

/// Full room state. Used by `state` and `join_success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshotMsg {
    pub data: Room,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub message: String,
}

impl ErrorMsg {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedMsg {
    pub user_id: UserId,
    pub data: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCreatedMsg {
    pub team_id: TeamId,
    pub team_name: String,
    pub team_color: String,
    pub data: Team,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamJoinedMsg {
    pub user_id: UserId,
    pub team_id: TeamId,
    pub team_name: String,
    pub data: Player,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSignalMsg {}
