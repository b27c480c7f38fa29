//! API handlers for the whosthere server.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use whosthere_flow::VisitReport;
use whosthere_session::{Session, TrackerError};

/// Longest accepted device identifier.
const MAX_DEVICE_ID_LEN: usize = 128;

/// Longest accepted text for the manual passphrase check.
const MAX_TEST_TEXT_LEN: usize = 512;

/// Query parameters for `POST /webhooks/doorbell`.
#[derive(Debug, Deserialize)]
pub struct DoorbellQuery {
    pub device_id: Option<String>,
}

/// Query parameters for `POST /test/password`.
#[derive(Deserialize)]
pub struct PasswordQuery {
    pub text: Option<String>,
}

/// Response body for the manual passphrase check.
///
/// Reports which configured phrase matched by index only.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordCheckResponse {
    pub matched: bool,
    pub score: f64,
    pub matched_index: Option<usize>,
    pub threshold: f64,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

fn validate_device_id(device_id: Option<String>) -> Result<String, ApiError> {
    let device_id = device_id
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::BadRequest("device_id is required".to_string()))?;

    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "device_id longer than {} bytes",
            MAX_DEVICE_ID_LEN
        )));
    }
    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ApiError::BadRequest(
            "device_id may only contain letters, digits, '-', '_', '.' and ':'".to_string(),
        ));
    }
    Ok(device_id)
}

/// Handler for `POST /webhooks/doorbell`.
///
/// Runs the whole visit and answers with its report. The visit runs on its
/// own task so a dropped request cannot abandon a half-finished session.
pub async fn doorbell_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<DoorbellQuery>,
) -> Result<Json<VisitReport>, ApiError> {
    let device_id = validate_device_id(query.device_id)?;
    tracing::info!(device_id = %device_id, "doorbell event received");

    let orchestrator = state.orchestrator.clone();
    let report =
        tokio::spawn(async move { orchestrator.handle_doorbell_event(&device_id).await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "visit task failed");
                ApiError::InternalServerError("visit task failed".to_string())
            })?;

    Ok(Json(report))
}

/// Handler for `POST /test/password`.
///
/// Scores raw text against the passphrase set without running a visit.
pub async fn test_password_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<PasswordQuery>,
) -> Result<Json<PasswordCheckResponse>, ApiError> {
    let text = query
        .text
        .ok_or_else(|| ApiError::BadRequest("text is required".to_string()))?;
    if text.len() > MAX_TEST_TEXT_LEN {
        return Err(ApiError::BadRequest(format!(
            "text longer than {} bytes",
            MAX_TEST_TEXT_LEN
        )));
    }

    let threshold = state.orchestrator.settings().threshold;
    let result = state.orchestrator.passphrases().check(&text, threshold);
    tracing::info!(
        matched = result.matched,
        score = result.score,
        "manual passphrase check"
    );

    Ok(Json(PasswordCheckResponse {
        matched: result.matched,
        score: result.score,
        matched_index: result.matched_phrase_index,
        threshold,
    }))
}

/// Handler for `GET /sessions/{session_id}`.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|_| ApiError::BadRequest(format!("invalid session id: {}", session_id)))?;

    match state.tracker.get(session_id) {
        Ok(session) => Ok(Json(session)),
        Err(TrackerError::NotFound(_)) => Err(ApiError::NotFound(format!(
            "session {} not found",
            session_id
        ))),
        Err(e) => Err(ApiError::InternalServerError(e.to_string())),
    }
}
