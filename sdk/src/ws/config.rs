//! WebSocket configuration.
//!
//! Provides configuration options for the shared streaming connection.

use std::time::Duration;

use super::error::WsError;

/// Default WebSocket URL.
pub const DEFAULT_WS_URL: &str = "wss://stream.tickstream.example/ws";

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 20;

/// Default staleness timeout in seconds.
pub const DEFAULT_STALE_TIMEOUT_SECS: u64 = 40;

/// Default staleness check interval in seconds.
pub const DEFAULT_STALE_CHECK_SECS: u64 = 5;

/// Default reconnect delay in seconds.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 1;

/// Maximum reconnect delay in seconds.
pub const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Maximum random jitter added to each reconnect delay, in milliseconds.
pub const DEFAULT_MAX_JITTER_MS: u64 = 300;

/// Default number of consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default outbound frame buffer.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,

    /// Interval between heartbeat pings while open.
    pub heartbeat_interval: Duration,

    /// Time without any inbound frame after which the socket is replaced.
    pub stale_timeout: Duration,

    /// How often staleness is checked.
    pub stale_check_interval: Duration,

    /// Initial reconnect delay.
    pub reconnect_delay: Duration,

    /// Maximum reconnect delay before jitter.
    pub max_reconnect_delay: Duration,

    /// Upper bound of the random jitter added to each delay.
    pub max_jitter: Duration,

    /// Listen key for user-scoped channels, sent as a query parameter.
    pub listen_key: Option<String>,

    /// Maximum consecutive reconnection attempts (None = unlimited).
    pub max_reconnect_attempts: Option<u32>,

    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            stale_timeout: Duration::from_secs(DEFAULT_STALE_TIMEOUT_SECS),
            stale_check_interval: Duration::from_secs(DEFAULT_STALE_CHECK_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_delay: Duration::from_secs(MAX_RECONNECT_DELAY_SECS),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
            listen_key: None,
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl WsConfig {
    /// Creates a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the staleness timeout and check interval.
    #[must_use]
    pub fn with_stale_timeout(mut self, timeout: Duration, check_every: Duration) -> Self {
        self.stale_timeout = timeout;
        self.stale_check_interval = check_every;
        self
    }

    /// Sets the initial reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the maximum reconnect delay.
    #[must_use]
    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Sets the maximum jitter.
    #[must_use]
    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Sets the listen key.
    #[must_use]
    pub fn with_listen_key(mut self, listen_key: impl Into<String>) -> Self {
        self.listen_key = Some(listen_key.into());
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Returns the connection URL for the given listen key.
    #[must_use]
    pub fn url_with_listen_key(&self, listen_key: Option<&str>) -> String {
        match listen_key {
            Some(key) if !key.is_empty() => {
                if self.url.contains('?') {
                    format!("{}&listenKey={}", self.url, key)
                } else {
                    format!("{}?listenKey={}", self.url, key)
                }
            }
            _ => self.url.clone(),
        }
    }

    /// Returns the connection URL with the configured listen key if set.
    #[must_use]
    pub fn connection_url(&self) -> String {
        self.url_with_listen_key(self.listen_key.as_deref())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), WsError> {
        if self.url.is_empty() {
            return Err(WsError::InvalidConfig("url cannot be empty".to_string()));
        }

        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(WsError::InvalidConfig(
                "url must start with ws:// or wss://".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() || self.stale_check_interval.is_zero() {
            return Err(WsError::InvalidConfig(
                "heartbeat and stale check intervals must be positive".to_string(),
            ));
        }

        if self.stale_timeout <= self.heartbeat_interval {
            return Err(WsError::InvalidConfig(
                "stale timeout must exceed the heartbeat interval".to_string(),
            ));
        }

        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(WsError::InvalidConfig(
                "max reconnect delay must be at least the reconnect delay".to_string(),
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(WsError::InvalidConfig(
                "outbound buffer must be positive".to_string(),
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
        let config = WsConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.stale_timeout, Duration::from_secs(40));
        assert_eq!(config.max_jitter, Duration::from_millis(300));
        assert_eq!(config.max_reconnect_attempts, Some(5));
        assert!(config.listen_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = WsConfig::new("wss://example.com/ws")
            .with_heartbeat_interval(Duration::from_secs(10))
            .with_stale_timeout(Duration::from_secs(25), Duration::from_secs(1))
            .with_reconnect_delay(Duration::from_secs(2))
            .with_max_reconnect_delay(Duration::from_secs(60))
            .with_max_jitter(Duration::ZERO)
            .with_listen_key("lk-1")
            .with_max_reconnect_attempts(None);

        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.stale_timeout, Duration::from_secs(25));
        assert_eq!(config.stale_check_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(60));
        assert_eq!(config.max_jitter, Duration::ZERO);
        assert_eq!(config.listen_key.as_deref(), Some("lk-1"));
        assert_eq!(config.max_reconnect_attempts, None);
    }

    #[test]
    fn test_config_connection_url() {
        let config = WsConfig::new("wss://example.com/ws");
        assert_eq!(config.connection_url(), "wss://example.com/ws");

        let config = config.with_listen_key("abc");
        assert_eq!(config.connection_url(), "wss://example.com/ws?listenKey=abc");

        let config = WsConfig::new("wss://example.com/ws?v=2").with_listen_key("abc");
        assert_eq!(
            config.connection_url(),
            "wss://example.com/ws?v=2&listenKey=abc"
        );
    }

    #[test]
    fn test_config_empty_listen_key_ignored() {
        let config = WsConfig::new("wss://example.com/ws");
        assert_eq!(config.url_with_listen_key(Some("")), "wss://example.com/ws");
    }

    #[test]
    fn test_config_validate_invalid() {
        assert!(WsConfig::new("").validate().is_err());
        assert!(WsConfig::new("https://example.com/ws").validate().is_err());

        let config = WsConfig::default()
            .with_stale_timeout(Duration::from_secs(10), Duration::from_secs(5));
        assert!(config.validate().is_err());

        let config = WsConfig::default().with_max_reconnect_delay(Duration::from_millis(10));
        assert!(config.validate().is_err());
    }
}
