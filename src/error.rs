//! Error taxonomy shared by the command store and the message buffer.

use thiserror::Error;

/// SQLite result codes (primary and extended) for busy and locked databases.
const SQLITE_CONTENTION_CODES: [&str; 6] = ["5", "6", "261", "262", "517", "773"];

/// RelayError is returned by every fallible core operation.
///
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed input, the caller's fault. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Storage could not be reached or failed mid-operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A concurrent writer conflicted with this unit of work.
    #[error("concurrent conflict: {0}")]
    ConcurrentConflict(String),
}

impl RelayError {
    /// Transient failures the caller may retry with backoff.
    ///
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::StorageUnavailable(_) | RelayError::ConcurrentConflict(_)
        )
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            let contended = db
                .code()
                .is_some_and(|code| SQLITE_CONTENTION_CODES.contains(&code.as_ref()));
            if contended || db.is_unique_violation() {
                return RelayError::ConcurrentConflict(db.message().to_string());
            }
        }
        RelayError::StorageUnavailable(e.to_string())
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
