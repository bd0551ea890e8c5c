//! Client error types.

use std::fmt;

/// REST client errors.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed.
    Request(reqwest::Error),

    /// Failed to deserialize response.
    Deserialization(String),

    /// API returned an error response.
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },

    /// Rate limited (429) after all retries.
    RateLimited {
        /// Retry after seconds.
        retry_after: Option<u64>,
    },

    /// Resource not found (404).
    NotFound(String),

    /// Unauthorized (401).
    Unauthorized,

    /// The session could not be refreshed; the user must log in again.
    SessionExpired,

    /// Request rejected before it was sent.
    InvalidRequest(String),

    /// Invalid configuration.
    InvalidConfig(String),

    /// Request timeout.
    Timeout,
}

impl ClientError {
    /// Returns true if the request may succeed when retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited { .. })
    }

    /// Returns true if the error means the caller is not authenticated.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::SessionExpired)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(e) => write!(f, "HTTP request failed: {}", e),
            Self::Deserialization(msg) => write!(f, "deserialization failed: {}", msg),
            Self::Api { code, message } => write!(f, "API error [{}]: {}", code, message),
            Self::RateLimited { retry_after } => {
                if let Some(secs) = retry_after {
                    write!(f, "rate limited, retry after {} seconds", secs)
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::NotFound(resource) => write!(f, "not found: {}", resource),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::SessionExpired => write!(f, "session expired, login required"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Timeout => write!(f, "request timeout"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

impl From<crate::error::SdkError> for ClientError {
    fn from(err: crate::error::SdkError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
