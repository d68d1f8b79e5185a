//! # Diffsync Engine
//!
//! A differential-synchronization engine for collections of records,
//! speaking JSON Patch.
//!
//! A client edits its copy of a collection and sends the edits as a patch.
//! The server applies the patch, commits the result, and answers with the
//! patch the client needs to catch up, typically the identities it assigned
//! to new records. Both sides converge without resending whole documents.
//!
//! ## Design Principles
//!
//! - **No IO**: storage is reached only through [`PersistenceCallback`]
//! - **All or nothing**: a failing patch leaves collection, shadow and storage untouched
//! - **Schema checked**: every write is checked against a [`CollectionSchema`]
//!
//! ## Core Concepts
//!
//! ### Records and pointers
//!
//! A [`Collection`] is an ordered list of flat [`Record`]s. Locations are
//! addressed with JSON Pointers ([`Pointer`]): `/1` is the second record,
//! `/1/complete` its `complete` field.
//!
//! ### Operations
//!
//! [`Operation`] covers the six JSON Patch operations: `test`, `add`,
//! `remove`, `replace`, `move` and `copy`. A [`Patch`] applies them in order.
//!
//! ### Shadows
//!
//! A shadow is the last state a client and the server agreed on, kept per
//! scope by a [`ShadowStore`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] runs one round per incoming patch and returns the
//! outgoing patch.
//!
//! ## Quick Start
//!
//! ```rust
//! use diffsync_engine::{
//!     CollectionSchema, FieldDef, FieldType, InMemoryRepository,
//!     InMemoryShadowStore, Patch, Reconciler,
//! };
//!
//! // 1. Define a schema
//! let schema = CollectionSchema::new(
//!     "todos",
//!     vec![
//!         FieldDef::optional("description", FieldType::String),
//!         FieldDef::required("complete", FieldType::Bool),
//!     ],
//! );
//!
//! // 2. Create a reconciler and a repository
//! let reconciler = Reconciler::new(schema, InMemoryShadowStore::new());
//! let repo = InMemoryRepository::new();
//!
//! // 3. Run a round that adds a record
//! let patch = Patch::from_json(
//!     r#"[{"op":"add","path":"/0","value":{"description":"D","complete":false}}]"#,
//! ).unwrap();
//! let outgoing = reconciler
//!     .reconcile("todos", &patch, || Ok(repo.find_all()), &repo)
//!     .unwrap();
//!
//! // 4. The client learns the assigned identity
//! assert_eq!(
//!     outgoing.to_json().unwrap(),
//!     r#"[{"op":"test","path":"/0/id"},{"op":"replace","path":"/0/id","value":"1"}]"#
//! );
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for use from other
//! languages. All data is exchanged as JSON strings.

pub mod diff;
pub mod error;
pub mod ffi;
pub mod operation;
pub mod patch;
pub mod persistence;
pub mod pointer;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod shadow;

// Re-export main types at crate root
pub use diff::{diff, ChangeSet};
pub use error::{Error, ErrorCategory, Result};
pub use operation::{IdentityPolicy, Operation, PatchContext};
pub use patch::Patch;
pub use persistence::{InMemoryRepository, PersistenceCallback};
pub use pointer::{Pointer, Segment, Target};
pub use reconcile::{Reconciler, ScopeLocks};
pub use record::{Collection, Record};
pub use schema::{CollectionSchema, FieldDef, FieldType};
pub use shadow::{InMemoryShadowStore, ShadowStore};

/// Server-assigned record identity
pub type RecordId = i64;

/// Name of the implicit identity field
pub const IDENTITY_FIELD: &str = "id";
