//! Database module for PostgreSQL persistence.

mod pool;
mod todos;

pub use pool::*;
pub use todos::*;
