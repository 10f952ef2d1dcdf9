//! Error taxonomy shared by every ledgerline crate.

use thiserror::Error;

/// Result type alias for ledgerline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the queue, cache, sync engine and facades.
#[derive(Debug, Error)]
pub enum Error {
    /// No valid session for a direct remote call.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// No connectivity to the remote store.
    #[error("Offline: {0}")]
    Offline(String),

    /// The remote store returned a domain/validation error.
    #[error("Remote store rejected the request: {0}")]
    RemoteRejected(String),

    /// Unexpected failure with no better classification.
    #[error("Unexpected error: {0}")]
    Unknown(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Durable store read/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Input validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} operations require an entity id")]
    MissingEntityId(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    pub fn remote_rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejected(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// True when the failure is about reaching the remote store rather than
    /// about the request itself, so deferring the write is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Offline(_) | Self::Unknown(_))
    }
}
