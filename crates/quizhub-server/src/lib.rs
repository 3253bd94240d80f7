pub mod api;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod hub;
pub mod scheduler;
pub mod state;
pub mod tls;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
///
/// Must be called inside a tokio runtime.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let web_root = config.web_root.clone();
    let state = AppState::new(config);

    // Question control (behind the optional bearer token)
    let api_routes = Router::new()
        .route("/activate-question", post(api::activate_question))
        .route("/deactivate-question", post(api::deactivate_question))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth,
        ));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&web_root))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state.clone());

    (app, state)
}

/// Start the tasks that run beside the router: the idle-room reaper.
pub fn spawn_background_tasks(state: &AppState) -> JoinHandle<()> {
    scheduler::spawn_reaper(
        Arc::clone(&state.hub),
        state.config.rooms.clone(),
        state.cancel.clone(),
    )
}
