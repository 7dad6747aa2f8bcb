//! Error taxonomy shared by the encounter tracker and the department desks.

use thiserror::Error;
use validator::ValidationErrors;

use crate::db::StoreError;

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Missing or malformed required input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The referenced patient, bed or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("no free medical record number left under prefix {prefix} after {attempts} attempts")]
    MrnExhausted { prefix: String, attempts: u32 },
    /// Opaque failure from the document store. Never retried here.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl TrackerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<ValidationErrors> for TrackerError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

// Documents that fail to (de)serialize are a storage concern, not a caller mistake.
impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(StoreError::Serialization(err))
    }
}
