//! Request handlers for diff-sync rounds.

mod todos;

pub use todos::*;
