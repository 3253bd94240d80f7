use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use crate::dispatch;
use crate::error::AppError;
use crate::state::AppState;

/// Body of both question endpoints. `duration` is in seconds; zero means
/// the question stays open until deactivated.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QuestionRequest {
    pub room_code: String,
    pub duration: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub success: bool,
    pub message: String,
    pub room_code: String,
}

fn parse_request(
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<QuestionRequest, AppError> {
    let Json(req) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected question request body");
        AppError::BadRequest("Invalid JSON".to_string())
    })?;
    if req.room_code.trim().is_empty() {
        return Err(AppError::BadRequest("Room code is required".to_string()));
    }
    Ok(req)
}

/// POST /api/activate-question
pub async fn activate_question(
    State(state): State<AppState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QuestionResponse>, AppError> {
    let req = parse_request(payload)?;
    let duration = (req.duration > 0).then(|| Duration::from_secs(req.duration));
    if !dispatch::activate_question(&state.hub, &req.room_code, duration).await {
        return Err(AppError::NotFound(dispatch::ROOM_NOT_FOUND.to_string()));
    }
    Ok(Json(QuestionResponse {
        success: true,
        message: "Question activated successfully".to_string(),
        room_code: req.room_code,
    }))
}

/// POST /api/deactivate-question
pub async fn deactivate_question(
    State(state): State<AppState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QuestionResponse>, AppError> {
    let req = parse_request(payload)?;
    if !dispatch::deactivate_question(&state.hub, &req.room_code).await {
        return Err(AppError::NotFound(dispatch::ROOM_NOT_FOUND.to_string()));
    }
    Ok(Json(QuestionResponse {
        success: true,
        message: "Question deactivated successfully".to_string(),
        room_code: req.room_code,
    }))
}
