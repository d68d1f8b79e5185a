//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use diffsync_engine::ShadowStore;
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Scope whose shadow this server keeps
    pub scope: String,
    /// Whether a shadow exists yet for that scope
    pub synced: bool,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scope: state.scope.to_string(),
        synced: state.reconciler.shadows().get(&state.scope).is_some(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Diff-Sync Todo Server"
}
