//! Storage error type.

use thiserror::Error;

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage error: {0}")]
    Backend(String),

    /// A write conflicted with committed data (e.g. a different hash at an
    /// already-indexed level).
    #[error("storage conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.to_string())
            }
            _ => Self::Backend(e.to_string()),
        }
    }
}
