//! Error types for drivers, the service and the migration executor.

use std::time::Duration;

use keel_core::CoreError;

/// Errors that can occur while talking to a backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The introspected table does not exist.
    ///
    /// The executor recovers this into a create plan; other callers see it
    /// as a plain lookup miss.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A statement did not finish within the configured timeout.
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    /// Schema, binder or conversion error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backend error, passed through unchanged.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A migration stopped part way.
///
/// `completed` is the number of statements that ran successfully before
/// `error`. Statements are not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("Migration failed after {completed} statement(s): {error}")]
pub struct MigrationFailure {
    /// Statements executed before the failure.
    pub completed: usize,
    /// The failure itself.
    #[source]
    pub error: Error,
}

impl MigrationFailure {
    /// Failure before any statement ran (planning or connection errors).
    #[must_use]
    pub const fn before_start(error: Error) -> Self {
        Self {
            completed: 0,
            error,
        }
    }
}
