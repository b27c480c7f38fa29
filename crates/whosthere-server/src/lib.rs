//! whosthere server library logic.
//!
//! Wires configuration, collaborators and the orchestrator together and
//! exposes the HTTP trigger surface.

pub mod api;
pub mod config;
pub mod retention;
pub mod startup;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use whosthere_flow::Orchestrator;
use whosthere_session::SessionTracker;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Runs doorbell visits.
    pub orchestrator: Arc<Orchestrator>,
    /// Session store shared with the orchestrator and the sweeper.
    pub tracker: Arc<SessionTracker>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            tracker: orchestrator.tracker().clone(),
            orchestrator,
        }
    }
}

/// Requests carry parameters in the query string only.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/doorbell", post(api::doorbell_handler))
        .route("/test/password", post(api::test_password_handler))
        .route("/sessions/{session_id}", get(api::get_session_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
