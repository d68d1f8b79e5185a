//! Error types for the diff-sync engine.

use serde_json::Value;
use thiserror::Error;

/// All possible errors from the diff-sync engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Path resolution errors
    #[error("invalid JSON pointer '{pointer}': {reason}")]
    InvalidPointer { pointer: String, reason: String },

    #[error("unsupported JSON pointer '{0}': tilde addressing is not implemented")]
    UnsupportedPointer(String),

    #[error("index {index} is out of range at JSON path '{path}' (size {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("unknown field '{field}' at JSON path '{path}'")]
    UnknownField { path: String, field: String },

    #[error("JSON path '{path}' cannot be the target of a {op} operation")]
    InvalidTarget { path: String, op: &'static str },

    // Type and nullability errors
    #[error("JSON path '{0}' is not nullable.")]
    NotNullable(String),

    #[error("type mismatch at JSON path '{path}': expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("JSON path '{0}' holds a server-assigned identity")]
    IdentityOwnership(String),

    // Assertion errors
    #[error("test failed at JSON path '{path}': actual value is {actual}")]
    TestFailed { path: String, actual: Value },

    // Boundary errors
    #[error("malformed patch: {0}")]
    MalformedPatch(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Coarse classification of an [`Error`], used by callers that translate
/// failures into transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The patch could not be decoded at all.
    Malformed,
    /// A pointer references an index or field that does not exist.
    PathResolution,
    /// An operation would write an incompatible type, a null into a
    /// non-nullable field, or a server-owned identity.
    TypeOrNullability,
    /// A `test` operation did not match; the client's baseline is stale.
    TestAssertion,
    /// The persistence callback failed.
    Persistence,
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedPatch(_) => ErrorCategory::Malformed,
            Error::InvalidPointer { .. }
            | Error::UnsupportedPointer(_)
            | Error::IndexOutOfRange { .. }
            | Error::UnknownField { .. }
            | Error::InvalidTarget { .. } => ErrorCategory::PathResolution,
            Error::NotNullable(_)
            | Error::TypeMismatch { .. }
            | Error::IdentityOwnership(_) => ErrorCategory::TypeOrNullability,
            Error::TestFailed { .. } => ErrorCategory::TestAssertion,
            Error::Persistence(_) => ErrorCategory::Persistence,
        }
    }

    /// The JSON path this error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::InvalidPointer { pointer, .. } => Some(pointer),
            Error::UnsupportedPointer(path)
            | Error::NotNullable(path)
            | Error::IdentityOwnership(path) => Some(path),
            Error::IndexOutOfRange { path, .. }
            | Error::UnknownField { path, .. }
            | Error::InvalidTarget { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::TestFailed { path, .. } => Some(path),
            Error::MalformedPatch(_) | Error::Persistence(_) => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
