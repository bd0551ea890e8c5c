//! Watch service configuration.
//!
//! Loaded from `TICKSTREAM_*` environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tickstream_sdk::client::config::DEFAULT_BASE_URL;
use tickstream_sdk::ws::config::DEFAULT_WS_URL;
use tickstream_sdk::{ChannelKind, MarketType};

/// Streaming endpoint.
pub const ENV_WS_URL: &str = "TICKSTREAM_WS_URL";
/// REST endpoint.
pub const ENV_API_URL: &str = "TICKSTREAM_API_URL";
/// Comma-separated symbols.
pub const ENV_SYMBOLS: &str = "TICKSTREAM_SYMBOLS";
/// Comma-separated channel names.
pub const ENV_CHANNELS: &str = "TICKSTREAM_CHANNELS";
/// `spot` or `futures`.
pub const ENV_MARKET_TYPE: &str = "TICKSTREAM_MARKET_TYPE";
/// Candle interval such as `1m`.
pub const ENV_CANDLE_INTERVAL: &str = "TICKSTREAM_CANDLE_INTERVAL";
/// File the listen key is persisted to.
pub const ENV_LISTEN_KEY_PATH: &str = "TICKSTREAM_LISTEN_KEY_PATH";
/// Consecutive reconnect attempts; `0` or `unbounded` for no limit.
pub const ENV_MAX_RECONNECTS: &str = "TICKSTREAM_MAX_RECONNECTS";
/// Bearer token for user channels.
pub const ENV_ACCESS_TOKEN: &str = "TICKSTREAM_ACCESS_TOKEN";
/// Refresh token paired with the access token.
pub const ENV_REFRESH_TOKEN: &str = "TICKSTREAM_REFRESH_TOKEN";

/// Configuration for the watch service.
#[derive(Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// WebSocket URL.
    pub ws_url: String,

    /// REST base URL.
    pub api_url: String,

    /// Symbols to watch.
    pub symbols: Vec<String>,

    /// Channels to watch.
    pub channels: Vec<ChannelKind>,

    /// Market type for order books.
    pub market_type: MarketType,

    /// Candle interval.
    pub candle_interval: String,

    /// Order book depth.
    pub depth: usize,

    /// Listen key file; keys are kept in memory when unset.
    pub listen_key_path: Option<PathBuf>,

    /// Consecutive reconnect attempts before giving up; `None` retries
    /// forever.
    pub max_reconnects: Option<u32>,

    /// Bearer token for user channels.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Refresh token.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for WatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchConfig")
            .field("ws_url", &self.ws_url)
            .field("api_url", &self.api_url)
            .field("symbols", &self.symbols)
            .field("channels", &self.channels)
            .field("market_type", &self.market_type)
            .field("candle_interval", &self.candle_interval)
            .field("depth", &self.depth)
            .field("listen_key_path", &self.listen_key_path)
            .field("max_reconnects", &self.max_reconnects)
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_BASE_URL.to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            channels: vec![ChannelKind::OrderBook, ChannelKind::Trades, ChannelKind::Ticker],
            market_type: MarketType::Spot,
            candle_interval: "1m".to_string(),
            depth: 20,
            listen_key_path: None,
            max_reconnects: Some(5),
            access_token: None,
            refresh_token: None,
        }
    }
}

impl WatchConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`; unset or blank variables
    /// keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get(ENV_WS_URL) {
            config.ws_url = url;
        }
        if let Some(url) = get(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(symbols) = get(ENV_SYMBOLS) {
            config.symbols = split_list(&symbols)
                .map(|s| s.to_ascii_uppercase())
                .collect();
        }
        if let Some(channels) = get(ENV_CHANNELS) {
            let mut parsed = Vec::new();
            for name in split_list(&channels) {
                let kind: ChannelKind = name
                    .parse()
                    .map_err(|_| ConfigError::UnknownChannel(name.to_string()))?;
                if !parsed.contains(&kind) {
                    parsed.push(kind);
                }
            }
            config.channels = parsed;
        }
        if let Some(market_type) = get(ENV_MARKET_TYPE) {
            config.market_type = market_type
                .parse()
                .map_err(|_| ConfigError::InvalidMarketType(market_type.clone()))?;
        }
        if let Some(interval) = get(ENV_CANDLE_INTERVAL) {
            config.candle_interval = interval;
        }
        if let Some(path) = get(ENV_LISTEN_KEY_PATH) {
            config.listen_key_path = Some(PathBuf::from(path));
        }
        if let Some(max) = get(ENV_MAX_RECONNECTS) {
            config.max_reconnects = parse_max_reconnects(&max)?;
        }
        config.access_token = get(ENV_ACCESS_TOKEN);
        config.refresh_token = get(ENV_REFRESH_TOKEN);

        Ok(config)
    }

    /// Returns true if any user-scoped channel is requested.
    #[must_use]
    pub fn wants_user_channels(&self) -> bool {
        self.channels.iter().any(ChannelKind::is_user_scoped)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidUrl(self.ws_url.clone()));
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.api_url.clone()));
        }

        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let needs_symbols = self
            .channels
            .iter()
            .any(|c| matches!(c, ChannelKind::OrderBook | ChannelKind::Trades | ChannelKind::Candles));
        if needs_symbols && self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }

        if self.channels.contains(&ChannelKind::Candles) && self.candle_interval.is_empty() {
            return Err(ConfigError::InvalidCandleInterval);
        }

        if self.depth == 0 {
            return Err(ConfigError::InvalidDepth);
        }

        if self.wants_user_channels() && self.access_token.is_none() {
            return Err(ConfigError::MissingAccessToken);
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_max_reconnects(raw: &str) -> Result<Option<u32>, ConfigError> {
    if raw.eq_ignore_ascii_case("unbounded") || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match raw.parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(ConfigError::InvalidNumber {
            name: ENV_MAX_RECONNECTS,
            value: raw.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// URL with an unexpected scheme.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// No channels requested.
    #[error("at least one channel is required")]
    NoChannels,

    /// Symbol-scoped channels requested without symbols.
    #[error("at least one symbol is required")]
    NoSymbols,

    /// Unknown channel name.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Unknown market type.
    #[error("invalid market type: {0}")]
    InvalidMarketType(String),

    /// Empty candle interval.
    #[error("candle interval cannot be empty")]
    InvalidCandleInterval,

    /// Zero order book depth.
    #[error("depth must be > 0")]
    InvalidDepth,

    /// User channels requested without a session.
    #[error("user channels require TICKSTREAM_ACCESS_TOKEN")]
    MissingAccessToken,

    /// Unparseable number.
    #[error("{name} must be a number, got {value}")]
    InvalidNumber {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.max_reconnects, Some(5));
        assert!(!config.wants_user_channels());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = WatchConfig::from_lookup(lookup(&[
            (ENV_WS_URL, "ws://localhost:9000/ws"),
            (ENV_SYMBOLS, " btcusdt, ethusdt ,"),
            (ENV_CHANNELS, "book,candles,kline"),
            (ENV_MARKET_TYPE, "Futures"),
            (ENV_CANDLE_INTERVAL, "5m"),
            (ENV_MAX_RECONNECTS, "unbounded"),
            (ENV_LISTEN_KEY_PATH, "/tmp/lk.json"),
        ]))
        .expect("config");

        assert_eq!(config.ws_url, "ws://localhost:9000/ws");
        assert_eq!(config.symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(config.channels, vec![ChannelKind::OrderBook, ChannelKind::Candles]);
        assert_eq!(config.market_type, MarketType::Futures);
        assert_eq!(config.candle_interval, "5m");
        assert_eq!(config.max_reconnects, None);
        assert_eq!(config.listen_key_path, Some(PathBuf::from("/tmp/lk.json")));
        assert_eq!(config.api_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = WatchConfig::from_lookup(lookup(&[(ENV_CHANNELS, "trades,news")]))
            .expect_err("unknown channel");
        assert_eq!(err, ConfigError::UnknownChannel("news".to_string()));

        let err = WatchConfig::from_lookup(lookup(&[(ENV_MAX_RECONNECTS, "many")]))
            .expect_err("bad number");
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        assert!(WatchConfig::from_lookup(lookup(&[(ENV_MARKET_TYPE, "margin")])).is_err());
    }

    #[test]
    fn test_validate() {
        let config = WatchConfig {
            ws_url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WatchConfig {
            symbols: Vec::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSymbols));

        let config = WatchConfig {
            symbols: Vec::new(),
            channels: vec![ChannelKind::Ticker],
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = WatchConfig {
            channels: vec![ChannelKind::Balances],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MissingAccessToken));

        let config = WatchConfig {
            channels: vec![ChannelKind::Balances],
            access_token: Some("token".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
