use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// CommandRecord is a single live command as seen by clients and devices.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: i64,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

/// Tells whether a submission created a record or refreshed an existing one.
///
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitStatus {
    Inserted,
    Updated,
}

/// Submission is the outcome of a single submit unit of work.
/// `evicted` holds the record dropped to stay within capacity, if any.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub status: SubmitStatus,
    pub record: CommandRecord,
    pub evicted: Option<CommandRecord>,
}

/// Default number of live command records kept by a store.
pub const DEFAULT_COMMAND_CAPACITY: usize = 50;

/// Trims the command text and rejects blank input.
///
pub(crate) fn normalize_command(text: &str) -> crate::error::Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(crate::error::RelayError::InvalidInput(
            "command must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}
