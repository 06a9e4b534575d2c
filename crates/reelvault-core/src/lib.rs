//! reelvault-core: shared types, error taxonomy, and configuration.
//!
//! This crate is the foundational dependency for the other reelvault
//! crates, providing the domain enums persisted to the database, the
//! typed SQLite error hierarchy, and the library configuration.

pub mod config;
pub mod error;
pub mod types;

// Re-export the most commonly used items at the crate root.
pub use config::LibraryConfig;
pub use error::{ConstraintKind, DatabaseError, Error, Result};
pub use types::*;
