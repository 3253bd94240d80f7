use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use quizhub_core::code::constant_time_eq;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for the question endpoints. None = auth disabled.
    pub api_token: Option<String>,
}

impl AuthConfig {
    /// True when no token is configured or `header` carries the right one.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        let Some(expected) = self.api_token.as_deref() else {
            return true;
        };
        header
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
    }
}

/// Rejects requests without a valid `Authorization: Bearer` header when a
/// token is configured.
pub async fn bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.auth.authorize(header) {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated API request");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_token_allows_everything() {
        let auth = AuthConfig::default();
        assert!(auth.authorize(None));
        assert!(auth.authorize(Some("Bearer whatever")));
    }

    #[test]
    fn token_must_match() {
        let auth = AuthConfig {
            api_token: Some("s3cret".into()),
        };
        assert!(auth.authorize(Some("Bearer s3cret")));
        assert!(!auth.authorize(Some("Bearer s3cre")));
        assert!(!auth.authorize(Some("s3cret")));
        assert!(!auth.authorize(None));
    }
}
