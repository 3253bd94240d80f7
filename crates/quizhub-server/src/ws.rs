use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::{HOST, ORIGIN};
use axum::http::uri::Authority;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use quizhub_core::net::protocol::decode_client_message_with_limit;

use crate::dispatch::{self, Session};
use crate::hub::{ClientEntry, Role};
use crate::state::AppState;

/// Room a connection lands in when the query string names none.
pub const DEFAULT_ROOM: &str = "default";

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub room: Option<String>,
    pub role: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(HOST).and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, host, &state.config.ws.allowed_origins) {
        tracing::warn!(origin = ?origin, host = ?host, "Rejected WebSocket origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let room = params
        .room
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_ROOM.to_string());
    if params.role.as_deref() == Some("admin") {
        tracing::warn!(room = %room, "Query string asked for admin role, connecting as viewer");
    }
    let role = Role::from_query(params.role.as_deref());

    ws.max_message_size(state.config.ws.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, room, role))
}

/// Accept an upgrade when the origin is absent, explicitly allowed, or an
/// http(s) origin on the same hostname as the request (ports ignored).
pub fn origin_allowed(origin: Option<&str>, host: Option<&str>, allowed: &[String]) -> bool {
    let Some(origin) = origin.map(str::trim).filter(|o| !o.is_empty()) else {
        return true;
    };
    let normalized = origin.trim_end_matches('/');
    if allowed.iter().any(|a| a == normalized) {
        return true;
    }
    same_host(normalized, host)
}

fn same_host(origin: &str, host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    let Ok(origin) = origin.parse::<Uri>() else {
        return false;
    };
    if !matches!(origin.scheme_str(), Some("http" | "https")) {
        return false;
    }
    let Ok(host) = host.parse::<Authority>() else {
        return false;
    };
    origin
        .host()
        .is_some_and(|h| h.eq_ignore_ascii_case(host.host()))
}

async fn handle_socket(socket: WebSocket, state: AppState, room: String, role: Role) {
    let id = Uuid::new_v4();
    let ws_cfg = &state.config.ws;
    let (tx, rx) = mpsc::channel::<Bytes>(ws_cfg.outbound_buffer);
    if !state
        .hub
        .register(id, ClientEntry::new(tx, room.clone(), role))
        .await
    {
        tracing::warn!(client_id = %id, "Hub is shutting down, dropping connection");
        return;
    }
    tracing::info!(client_id = %id, room = %room, role = role.as_str(), "Client connected");

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = spawn_writer(ws_sender, rx, ws_cfg.ping_period(), ws_cfg.write_timeout());
    let mut session = Session::new(id, room, role);

    tokio::select! {
        _ = read_loop(&mut ws_receiver, &state, &mut session) => {},
        _ = &mut writer => {
            tracing::debug!(client_id = %id, "Writer finished first");
        },
    }

    // Dropping the registry entry closes the queue; the writer then sends a
    // Close frame and exits on its own.
    state.hub.unregister(id);
    tracing::info!(client_id = %id, room = %session.room_code, "Client disconnected");
}

/// Drain the outbound queue onto the socket and ping on an interval.
fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    ping_period: Duration,
    write_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + ping_period;
        let mut ping = tokio::time::interval_at(start, ping_period);
        loop {
            let msg = tokio::select! {
                data = rx.recv() => match data {
                    Some(data) => match text_frame(data) {
                        Some(msg) => msg,
                        None => continue,
                    },
                    None => {
                        let _ = tokio::time::timeout(write_timeout, ws_sender.send(Message::Close(None))).await;
                        break;
                    },
                },
                _ = ping.tick() => Message::Ping(Bytes::new()),
            };
            match tokio::time::timeout(write_timeout, ws_sender.send(msg)).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    break;
                },
                Err(_) => {
                    tracing::debug!("WebSocket write deadline exceeded");
                    break;
                },
            }
        }
    })
}

/// Wrap a shared outbound frame as a text message. The buffer is reused,
/// not copied, so one broadcast frame backs every recipient's message.
fn text_frame(data: Bytes) -> Option<Message> {
    match Utf8Bytes::try_from(data) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping non-UTF-8 outbound frame");
            None
        },
    }
}

/// Decode and dispatch inbound frames until the peer goes away, errors, or
/// stays silent past the read deadline. Any frame, pongs included, resets
/// the deadline.
async fn read_loop(
    ws_receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
    session: &mut Session,
) {
    let read_timeout = state.config.ws.read_timeout();
    let max_size = state.config.ws.max_message_size;

    loop {
        let msg = match tokio::time::timeout(read_timeout, ws_receiver.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(client_id = %session.id, error = %e, "WebSocket read failed");
                break;
            },
            Ok(None) => break,
            Err(_) => {
                tracing::info!(client_id = %session.id, "Read deadline exceeded");
                break;
            },
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Binary(_) => {
                tracing::debug!(client_id = %session.id, "Ignoring binary frame");
                continue;
            },
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match decode_client_message_with_limit(text.as_str(), max_size) {
            Ok(event) => dispatch::handle(&state.hub, session, event).await,
            Err(e) => {
                tracing::warn!(client_id = %session.id, error = %e, "Discarding malformed event");
            },
        }
    }
}
