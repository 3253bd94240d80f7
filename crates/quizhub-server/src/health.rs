use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: usize,
    pub rooms: RoomInfo,
}

#[derive(Serialize)]
pub struct RoomInfo {
    pub active: usize,
    pub players: usize,
}

/// GET /health: liveness plus connection and room counts.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.connection_count().await;
    let (active, players) = state.hub.stats().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections,
        rooms: RoomInfo { active, players },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use quizhub_core::time::now_millis;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            connections: 5,
            rooms: RoomInfo {
                active: 1,
                players: 3,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"healthy\""));
        assert!(json.contains("\"connections\":5"));
        assert!(json.contains("\"active\":1"));
    }

    #[tokio::test]
    async fn health_counts_rooms_and_players() {
        let state = AppState::new(ServerConfig::default());
        let (_, room) = state.hub.create_room(now_millis()).await;
        room.write().await.upsert_player("u1", "b1", "Ann");

        let Json(resp) = health_check(State(state)).await;
        assert_eq!(resp.connections, 0);
        assert_eq!(resp.rooms.active, 1);
        assert_eq!(resp.rooms.players, 1);
    }
}
