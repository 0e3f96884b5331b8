//! Store error types.

use thiserror::Error;

/// Errors from the dedup store and run journal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Schema migration failed.
    #[error("migration failed: {message}")]
    Migration {
        /// What went wrong.
        message: String,
    },
    /// Filesystem error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Journal (de)serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
