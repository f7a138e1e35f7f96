//! Error types for the storage layer.

use thiserror::Error;

/// Errors surfaced by the key-value store and its adapters.
///
/// `Unavailable` (binding missing, backend down, call timed out) is kept
/// distinct from `NotFound` (key absent) so callers can map them to
/// different HTTP statuses.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing store is not reachable or the call timed out.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes could not be decoded into the expected shape.
    #[error("corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
