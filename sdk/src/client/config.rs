//! Client configuration.
//!
//! Provides configuration options for the REST client.

use std::time::Duration;

use super::auth::Session;
use super::error::ClientError;

/// Default base URL for the API.
pub const DEFAULT_BASE_URL: &str = "https://api.tickstream.example/v1";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum number of retries for rate-limited or timed-out requests.
    pub max_retries: u32,

    /// Session to start with, if the caller already holds tokens.
    pub session: Option<Session>,

    /// User agent string.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            session: None,
            user_agent: format!("tickstream-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets a bearer token without a refresh token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.session = Some(Session::new(token));
        self
    }

    /// Sets the initial session.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::InvalidConfig(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ClientError::InvalidConfig(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.session.is_none());
        assert!(config.user_agent.starts_with("tickstream-sdk/"));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("https://api.example.com")
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1)
            .with_bearer_token("access")
            .with_user_agent("terminal/1.0");

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 1);
        assert_eq!(
            config.session.as_ref().map(|s| s.access_token.as_str()),
            Some("access")
        );
        assert!(config.session.as_ref().and_then(|s| s.refresh_token.as_ref()).is_none());
        assert_eq!(config.user_agent, "terminal/1.0");
    }

    #[test]
    fn test_config_validate() {
        assert!(ClientConfig::new("https://api.example.com").validate().is_ok());
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("ftp://api.example.com").validate().is_err());
        assert!(ClientConfig::new("http://localhost:8080")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
