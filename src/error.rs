//! Errors raised at the record store boundary.
//!
//! Only `Unavailable` is worth retrying; query and decode failures will
//! fail the same way on the next attempt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record query failed: {0}")]
    Query(String),

    #[error("failed to decode {field}: {reason}")]
    Decode { field: String, reason: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { index, source } => StoreError::Decode {
                field: index,
                reason: source.to_string(),
            },
            other => StoreError::Query(other.to_string()),
        }
    }
}
