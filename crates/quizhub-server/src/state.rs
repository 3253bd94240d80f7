use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    /// Fired on shutdown; stops the hub intake loop and the room reaper.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Must be called inside a tokio runtime: starts the hub intake loop.
    pub fn new(config: ServerConfig) -> Self {
        let cancel = CancellationToken::new();
        let auth = AuthConfig {
            api_token: config.auth.api_token.clone(),
        };
        Self {
            hub: Hub::start(cancel.clone()),
            auth,
            config: Arc::new(config),
            cancel,
        }
    }
}
