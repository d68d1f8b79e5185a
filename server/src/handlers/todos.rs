//! Todo handlers - run diff-sync rounds against the repository.

use crate::error::{AppError, Result};
use crate::AppState;
use diffsync_engine::{Collection, Patch};

/// Media type of JSON Patch documents.
pub const JSON_PATCH: &str = "application/json-patch+json";

/// Whether a request body of `content_type` may be read as a patch.
///
/// A missing header is accepted; so is plain `application/json`.
pub fn accepts_patch(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == JSON_PATCH || essence == "application/json"
}

/// Apply a client's patch and return the patch the client must apply.
///
/// The round blocks on storage, so it runs on the blocking pool.
pub async fn handle_patch(state: AppState, body: String) -> Result<Patch> {
    let patch = Patch::from_json(&body)?;
    tracing::debug!(
        scope = %state.scope,
        operations = patch.len(),
        "Received patch"
    );

    tokio::task::spawn_blocking(move || {
        let repository = &state.repository;
        state
            .reconciler
            .reconcile(&state.scope, &patch, || repository.find_all(), repository)
    })
    .await
    .map_err(|e| AppError::Internal(format!("reconciliation task failed: {}", e)))?
    .map_err(AppError::from)
}

/// Read the authoritative todo list.
pub async fn handle_list(state: AppState) -> Result<Collection> {
    tokio::task::spawn_blocking(move || state.repository.find_all())
        .await
        .map_err(|e| AppError::Internal(format!("load task failed: {}", e)))?
        .map_err(AppError::from)
}
