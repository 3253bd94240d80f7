use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use quizhub_core::net::messages::{ClientMessage, ServerMessage};
use quizhub_core::net::protocol::{decode_server_message, encode_client_message};
use quizhub_core::room::Room;

use quizhub_server::config::{AuthFileConfig, ServerConfig};
use quizhub_server::state::AppState;
use quizhub_server::{build_app, spawn_background_tasks};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server whose question endpoints require `token`.
    pub async fn with_api_token(token: &str) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                api_token: Some(token.to_string()),
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);
        spawn_background_tasks(&state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a raw JSON text frame.
pub async fn ws_send_json(stream: &mut WsStream, json: &str) {
    stream.send(Message::Text(json.to_string().into())).await.unwrap();
}

/// Send a ClientMessage as a JSON text frame.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Text(encoded.into())).await.unwrap();
}

/// Read the next text frame (5s timeout).
pub async fn ws_read_text(stream: &mut WsStream) -> String {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Try to read a text frame, returning None on timeout.
pub async fn ws_try_read_text(stream: &mut WsStream, timeout_ms: u64) -> Option<String> {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Read the next ServerMessage (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let text = ws_read_text(stream).await;
    decode_server_message(&text).unwrap()
}

/// Skip frames until a `state` snapshot arrives and return its room.
pub async fn ws_read_state(stream: &mut WsStream) -> Room {
    loop {
        if let ServerMessage::State(s) = ws_read_server_msg(stream).await {
            return s.data;
        }
    }
}

/// Send `create_room` and consume the replies addressed to the creator.
/// Returns (room code, admin token).
pub async fn ws_create_room(stream: &mut WsStream) -> (String, String) {
    ws_send_json(stream, r#"{"type":"create_room"}"#).await;
    let (code, token) = match ws_read_server_msg(stream).await {
        ServerMessage::RoomCreated(created) => (created.data.code, created.admin_token),
        other => panic!("Expected RoomCreated, got: {other:?}"),
    };
    // Direct snapshot, then the room broadcast
    ws_read_state(stream).await;
    ws_read_state(stream).await;
    (code, token)
}

/// Send `join` for `room_code` and consume join_success plus the snapshots.
pub async fn ws_join(stream: &mut WsStream, room_code: &str, user_id: &str, nickname: &str) -> Room {
    let join = format!(
        r#"{{"type":"join","quizId":"{room_code}","userId":"{user_id}","buttonId":"btn-{user_id}","nickname":"{nickname}"}}"#
    );
    ws_send_json(stream, &join).await;
    let room = match ws_read_server_msg(stream).await {
        ServerMessage::JoinSuccess(s) => s.data,
        other => panic!("Expected JoinSuccess, got: {other:?}"),
    };
    // Direct snapshot, player_joined, room snapshot
    ws_read_state(stream).await;
    ws_read_state(stream).await;
    room
}
