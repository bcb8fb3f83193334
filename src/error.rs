//! Error taxonomy for task operations

use thiserror::Error;

/// Errors surfaced by the engine, the store and the persistence gateways.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Caller-supplied input was rejected; nothing was changed
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid credential; the caller must re-authenticate
    #[error("unauthorized")]
    Unauthorized,

    /// The request itself could not be understood (malformed body or query)
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Backing store fault (SQLite, corrupt payload, poisoned lock)
    #[error("storage error: {0}")]
    Storage(String),
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<rusqlite::Error> for TaskError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("invalid stored collection: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
