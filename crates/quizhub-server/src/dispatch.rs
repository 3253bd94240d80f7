//! Maps inbound events onto room mutations and broadcasts.
//!
//! Every room-scoped case runs under that room's write lock, including the
//! broadcast that follows, so frames for one room leave in mutation order.
//! Failures never propagate: they become an `error` or `join_error` frame
//! for the originating client only.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use quizhub_core::net::messages::{
    AdminAuthMsg, ClickMsg, ClientMessage, CreateTeamMsg, ErrorMsg, HostSetStateMsg, JoinMsg,
    JoinTeamMsg, PlayerJoinedMsg, QuestionSignalMsg, RoomCreatedMsg, ServerMessage,
    TeamCreatedMsg, TeamJoinedMsg,
};
use quizhub_core::net::protocol::{
    ProtocolError, encode_join_success, encode_server_message, encode_state,
};
use quizhub_core::room::{Phase, Room};
use quizhub_core::time::now_millis;

use crate::hub::{ClientId, Hub, Role, SharedRoom};
use crate::scheduler;

pub const ROOM_NOT_FOUND: &str = "Room not found";
pub const INVALID_ADMIN_PASSWORD: &str = "Invalid admin password";
pub const ADMIN_ONLY: &str = "Only admin can create teams";
pub const HOST_ONLY: &str = "Only host can change phase";
pub const TEAM_NOT_FOUND: &str = "Team not found";

/// Per-connection dispatch context. Mirrors what the hub registry holds
/// for the client.
///
/// `role` is only meaningful for `room_code`: privileged events aimed at
/// any other room are refused.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: ClientId,
    pub room_code: String,
    pub role: Role,
    /// Role requested at upgrade, restored when joining another room.
    upgrade_role: Role,
}

impl Session {
    pub fn new(id: ClientId, room_code: String, role: Role) -> Self {
        Self {
            id,
            room_code,
            role,
            upgrade_role: role,
        }
    }

    /// Whether this session holds `role` in room `code`.
    fn holds(&self, role: Role, code: &str) -> bool {
        self.role == role && self.room_code == code
    }

    async fn attach(&mut self, hub: &Hub, room_code: &str, role: Role) {
        self.room_code = room_code.to_string();
        self.role = role;
        if !hub.attach(self.id, room_code, role).await {
            tracing::debug!(client_id = %self.id, "Attach skipped, client no longer live");
        }
    }
}

/// Handle one decoded event from `session`.
pub async fn handle(hub: &Arc<Hub>, session: &mut Session, msg: ClientMessage) {
    let target = msg
        .target_room()
        .unwrap_or(session.room_code.as_str())
        .to_string();
    tracing::debug!(
        client_id = %session.id, kind = msg.kind(), room = %target,
        "Dispatching event"
    );

    match msg {
        ClientMessage::CreateRoom(_) => create_room(hub, session).await,
        ClientMessage::AdminAuth(m) => admin_auth(hub, session, m).await,
        ClientMessage::Join(m) => join(hub, session, &target, m).await,
        ClientMessage::CreateTeam(m) => create_team(hub, session, &target, m).await,
        ClientMessage::JoinTeam(m) => join_team(hub, session, &target, m).await,
        ClientMessage::Click(m) => click(hub, session, &target, m).await,
        ClientMessage::HostSetState(m) => host_set_state(hub, session, &target, m).await,
    }
}

async fn create_room(hub: &Arc<Hub>, session: &mut Session) {
    let (code, shared) = hub.create_room(now_millis()).await;
    session.attach(hub, &code, Role::Admin).await;

    let room = shared.read().await;
    let created = ServerMessage::RoomCreated(RoomCreatedMsg {
        data: room.clone(),
        admin_token: room.admin_secret().to_string(),
    });
    send(hub, session.id, encode_server_message(&created)).await;
    send(hub, session.id, encode_state(&room)).await;
    broadcast_state(hub, &room).await;
}

async fn admin_auth(hub: &Arc<Hub>, session: &mut Session, m: AdminAuthMsg) {
    let Some(shared) = find_room(hub, session, &m.room_code).await else {
        return;
    };
    let mut room = shared.write().await;
    if !room.check_admin_secret(&m.password) {
        tracing::warn!(client_id = %session.id, room = %room.code, "Admin auth rejected");
        send_error(hub, session.id, INVALID_ADMIN_PASSWORD).await;
        return;
    }
    room.touch(now_millis());
    session.attach(hub, &room.code, Role::Admin).await;
    tracing::info!(client_id = %session.id, room = %room.code, "Admin authenticated");
    broadcast_state(hub, &room).await;
}

async fn join(hub: &Arc<Hub>, session: &mut Session, code: &str, m: JoinMsg) {
    let Some(shared) = hub.get_room(code).await else {
        tracing::info!(client_id = %session.id, room = code, "Join for unknown room");
        let msg = ServerMessage::JoinError(ErrorMsg::new(ROOM_NOT_FOUND));
        send(hub, session.id, encode_server_message(&msg)).await;
        return;
    };
    let mut room = shared.write().await;
    room.touch(now_millis());
    let player = room
        .upsert_player(&m.user_id, &m.button_id, &m.nickname)
        .clone();
    // Admin rights belong to one room; moving rooms drops them.
    let role = if session.room_code == room.code {
        session.role
    } else {
        session.upgrade_role
    };
    session.attach(hub, &room.code, role).await;
    tracing::info!(user_id = %m.user_id, room = %room.code, "Player joined");

    send(hub, session.id, encode_join_success(&room)).await;
    send(hub, session.id, encode_state(&room)).await;
    let joined = ServerMessage::PlayerJoined(PlayerJoinedMsg {
        user_id: m.user_id,
        data: player,
    });
    broadcast(hub, &room.code, encode_server_message(&joined)).await;
    broadcast_state(hub, &room).await;
}

async fn create_team(hub: &Arc<Hub>, session: &Session, code: &str, m: CreateTeamMsg) {
    let Some(shared) = find_room(hub, session, code).await else {
        return;
    };
    if !session.holds(Role::Admin, code) {
        tracing::warn!(
            client_id = %session.id, role = session.role.as_str(), room = code,
            "Team creation rejected"
        );
        send_error(hub, session.id, ADMIN_ONLY).await;
        return;
    }
    let mut room = shared.write().await;
    let now = now_millis();
    room.touch(now);
    let team = room.create_team(&m.team_name, &m.team_color, now).clone();
    tracing::info!(room = %room.code, team_id = %team.id, name = %team.name, "Team created");

    let created = ServerMessage::TeamCreated(TeamCreatedMsg {
        team_id: team.id.clone(),
        team_name: team.name.clone(),
        team_color: team.color.clone(),
        data: team,
    });
    broadcast(hub, &room.code, encode_server_message(&created)).await;
    broadcast_state(hub, &room).await;
}

async fn join_team(hub: &Arc<Hub>, session: &Session, code: &str, m: JoinTeamMsg) {
    let Some(shared) = find_room(hub, session, code).await else {
        return;
    };
    let mut room = shared.write().await;
    room.touch(now_millis());
    match room.join_team(&m.user_id, &m.nickname, &m.team_id) {
        Some(team_name) => {
            if let Some(player) = room.players.get(&m.user_id).cloned() {
                tracing::info!(user_id = %m.user_id, team = %team_name, room = %room.code, "Player joined team");
                let joined = ServerMessage::TeamJoined(TeamJoinedMsg {
                    user_id: m.user_id,
                    team_id: m.team_id,
                    team_name,
                    data: player,
                });
                broadcast(hub, &room.code, encode_server_message(&joined)).await;
            }
        },
        None => send_error(hub, session.id, TEAM_NOT_FOUND).await,
    }
    broadcast_state(hub, &room).await;
}

async fn click(hub: &Arc<Hub>, session: &Session, code: &str, m: ClickMsg) {
    let Some(shared) = find_room(hub, session, code).await else {
        return;
    };
    let mut room = shared.write().await;
    let now = now_millis();
    room.touch(now);
    let outcome = room.register_click(&m.user_id, &m.button_id, now);
    if outcome.false_start {
        tracing::debug!(user_id = %m.user_id, room = %room.code, phase = %room.phase, "False start");
    }
    if outcome.first_answer {
        tracing::info!(user_id = %m.user_id, room = %room.code, "First answer");
    }
    broadcast_state(hub, &room).await;
}

async fn host_set_state(hub: &Arc<Hub>, session: &Session, code: &str, m: HostSetStateMsg) {
    let Some(shared) = find_room(hub, session, code).await else {
        return;
    };
    if !session.holds(Role::Host, code) {
        tracing::warn!(
            client_id = %session.id, role = session.role.as_str(), room = code,
            "Phase change rejected"
        );
        send_error(hub, session.id, HOST_ONLY).await;
        return;
    }
    let mut room = shared.write().await;
    let now = now_millis();
    room.touch(now);
    if m.phase == Phase::Ready {
        let epoch = room.arm_ready(now, m.delay_ms);
        scheduler::schedule_start(
            Arc::clone(hub),
            Arc::clone(&shared),
            room.code.clone(),
            epoch,
            Duration::from_millis(m.delay_ms),
        );
    } else {
        room.set_phase(m.phase);
    }
    tracing::info!(room = %room.code, phase = %m.phase, delay_ms = m.delay_ms, "Phase set by host");
    broadcast_state(hub, &room).await;
}

/// Open the question window of `code`, broadcasting `start_question`. With
/// a duration, the window closes on its own unless re-opened or closed
/// first. Returns false if the room does not exist.
pub async fn activate_question(hub: &Arc<Hub>, code: &str, duration: Option<Duration>) -> bool {
    let Some(shared) = hub.get_room(code).await else {
        return false;
    };
    let mut room = shared.write().await;
    let now = now_millis();
    room.touch(now);
    let epoch = room.activate_question(now);
    tracing::info!(room = %room.code, duration_secs = duration.map(|d| d.as_secs()), "Question activated");

    let start = ServerMessage::StartQuestion(QuestionSignalMsg {});
    broadcast(hub, &room.code, encode_server_message(&start)).await;
    broadcast_state(hub, &room).await;

    if let Some(after) = duration {
        scheduler::schedule_question_close(
            Arc::clone(hub),
            Arc::clone(&shared),
            room.code.clone(),
            epoch,
            after,
        );
    }
    true
}

/// Close the question window of `code`, broadcasting `next_question`.
/// Returns false if the room does not exist.
pub async fn deactivate_question(hub: &Hub, code: &str) -> bool {
    let Some(shared) = hub.get_room(code).await else {
        return false;
    };
    let mut room = shared.write().await;
    room.touch(now_millis());
    room.deactivate_question();
    tracing::info!(room = %room.code, "Question deactivated");
    broadcast_question_closed(hub, &room).await;
    true
}

/// `next_question` followed by a snapshot. Caller holds the room lock.
pub(crate) async fn broadcast_question_closed(hub: &Hub, room: &Room) {
    let next = ServerMessage::NextQuestion(QuestionSignalMsg {});
    broadcast(hub, &room.code, encode_server_message(&next)).await;
    broadcast_state(hub, room).await;
}

/// Full snapshot to everyone in the room. Caller holds the room lock.
pub(crate) async fn broadcast_state(hub: &Hub, room: &Room) {
    broadcast(hub, &room.code, encode_state(room)).await;
}

async fn find_room(hub: &Hub, session: &Session, code: &str) -> Option<SharedRoom> {
    let room = hub.get_room(code).await;
    if room.is_none() {
        tracing::debug!(client_id = %session.id, room = code, "Event for unknown room");
        send_error(hub, session.id, ROOM_NOT_FOUND).await;
    }
    room
}

async fn send_error(hub: &Hub, id: ClientId, message: &str) {
    let msg = ServerMessage::Error(ErrorMsg::new(message));
    send(hub, id, encode_server_message(&msg)).await;
}

fn into_frame(encoded: Result<String, ProtocolError>) -> Option<Bytes> {
    match encoded {
        Ok(text) => Some(Bytes::from(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound frame");
            None
        },
    }
}

async fn send(hub: &Hub, id: ClientId, encoded: Result<String, ProtocolError>) {
    if let Some(frame) = into_frame(encoded) {
        hub.send_to(id, &frame).await;
    }
}

async fn broadcast(hub: &Hub, room_code: &str, encoded: Result<String, ProtocolError>) {
    if let Some(frame) = into_frame(encoded) {
        hub.broadcast_to_room(room_code, &frame).await;
    }
}
