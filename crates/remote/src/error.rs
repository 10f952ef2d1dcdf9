//! Error types for the remote store client.

use ledgerline_core::Error;
use thiserror::Error;

/// Retry policy class for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status from the API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Success status but the envelope reported a failure
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or unusable session
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteApiError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// No response reached us: refused connection or timeout.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_connect() || err.is_timeout())
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) | Self::InvalidResponse(_) => ApiRetryClass::Retryable,
            Self::Rejected(_) | Self::InvalidRequest(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }
}

impl From<RemoteApiError> for Error {
    fn from(err: RemoteApiError) -> Self {
        let message = err.to_string();
        if err.is_unreachable() {
            return Error::Offline(message);
        }
        match (&err, err.retry_class()) {
            (_, ApiRetryClass::ReauthRequired) => Error::Unauthenticated(message),
            (RemoteApiError::Api { .. }, ApiRetryClass::Retryable) => Error::Unknown(message),
            (RemoteApiError::Api { status, .. }, _) if (400..500).contains(status) => {
                Error::RemoteRejected(message)
            }
            (RemoteApiError::Rejected(_) | RemoteApiError::InvalidRequest(_), _) => {
                Error::RemoteRejected(message)
            }
            _ => Error::Unknown(message),
        }
    }
}
