//! WebSocket error types.
//!
//! Provides error types for streaming operations and channel decoding.

use std::fmt;

use thiserror::Error;

/// WebSocket errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// Connection failed.
    Connection(String),

    /// WebSocket protocol error.
    Protocol(String),

    /// Failed to serialize a frame.
    Serialization(String),

    /// Not connected.
    NotConnected,

    /// Connection closed.
    Closed,

    /// Invalid configuration.
    InvalidConfig(String),

    /// Send failed.
    SendFailed(String),

    /// Listen key could not be obtained or refreshed.
    ListenKey(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Self::NotConnected => write!(f, "not connected"),
            Self::Closed => write!(f, "connection closed"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::SendFailed(msg) => write!(f, "send failed: {}", msg),
            Self::ListenKey(msg) => write!(f, "listen key error: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors raised while decoding a channel payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON or not an object.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame carries no payload for the channel.
    #[error("missing payload for channel {channel}")]
    MissingPayload {
        /// Channel name.
        channel: String,
    },

    /// The payload does not match the channel's shape.
    #[error("invalid {channel} payload: {reason}")]
    InvalidPayload {
        /// Channel name.
        channel: String,
        /// What went wrong.
        reason: String,
    },
}

impl DecodeError {
    /// Creates an invalid payload error.
    pub fn invalid(channel: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::InvalidPayload {
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_display() {
        let err = WsError::Connection("timeout".to_string());
        assert_eq!(err.to_string(), "connection failed: timeout");
        assert_eq!(WsError::NotConnected.to_string(), "not connected");
        assert_eq!(WsError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn test_ws_error_listen_key() {
        let err = WsError::ListenKey("expired".to_string());
        assert_eq!(err.to_string(), "listen key error: expired");
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::MissingPayload {
            channel: "trades".to_string(),
        };
        assert_eq!(err.to_string(), "missing payload for channel trades");

        let err = DecodeError::invalid("orderbook", "bids is not an array");
        assert_eq!(
            err.to_string(),
            "invalid orderbook payload: bids is not an array"
        );
    }
}
