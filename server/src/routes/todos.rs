//! Todo endpoint routes.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use diffsync_engine::Collection;

use crate::error::{AppError, Result};
use crate::handlers::{accepts_patch, handle_list, handle_patch, JSON_PATCH};
use crate::AppState;

/// Create todo routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/todos", get(list_handler).patch(patch_handler))
}

/// PATCH /todos - Run one diff-sync round.
async fn patch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !accepts_patch(content_type) {
        return Err(AppError::UnsupportedMediaType(
            content_type.unwrap_or_default().to_string(),
        ));
    }

    let outgoing = handle_patch(state, body).await?;
    let json = outgoing.to_json()?;
    Ok(([(header::CONTENT_TYPE, JSON_PATCH)], json).into_response())
}

/// GET /todos - List todos.
async fn list_handler(State(state): State<AppState>) -> Result<Json<Collection>> {
    let todos = handle_list(state).await?;
    Ok(Json(todos))
}
