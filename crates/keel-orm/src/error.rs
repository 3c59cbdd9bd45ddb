//! Error types for the ORM.

use keel_core::CoreError;
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// A single-row select matched nothing.
    #[error("no rows in result set")]
    NoRows,

    /// Statement or backend error.
    #[error(transparent)]
    Service(#[from] keel_migrate::Error),

    /// Schema or conversion error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
