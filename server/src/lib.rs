//! Diff-sync server: exposes a todo list over JSON Patch.
//!
//! Clients send `PATCH /todos` with the edits they made since the last
//! round and receive the patch that brings them in line with the server.
//! Each round runs through [`diffsync_engine::Reconciler`]; storage is
//! PostgreSQL in production and [`InMemoryRepository`] in tests.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use axum::Router;
use diffsync_engine::{
    Collection, CollectionSchema, FieldDef, FieldType, InMemoryRepository, InMemoryShadowStore,
    PersistenceCallback, Reconciler,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Storage for the todo list: loads the authoritative collection and
/// commits reconciliation rounds.
pub trait TodoRepository: PersistenceCallback {
    /// Every todo, in identity order.
    fn find_all(&self) -> diffsync_engine::Result<Collection>;
}

impl TodoRepository for InMemoryRepository {
    fn find_all(&self) -> diffsync_engine::Result<Collection> {
        Ok(InMemoryRepository::find_all(self))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn TodoRepository>,
    pub reconciler: Arc<Reconciler<InMemoryShadowStore>>,
    pub scope: Arc<str>,
}

impl AppState {
    pub fn new(repository: Arc<dyn TodoRepository>, scope: impl Into<Arc<str>>) -> Self {
        Self {
            repository,
            reconciler: Arc::new(Reconciler::new(todo_schema(), InMemoryShadowStore::new())),
            scope: scope.into(),
        }
    }
}

/// Schema of a todo: optional description, required completion flag.
pub fn todo_schema() -> CollectionSchema {
    CollectionSchema::new(
        "todos",
        vec![
            FieldDef::optional("description", FieldType::String),
            FieldDef::required("complete", FieldType::Bool),
        ],
    )
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
