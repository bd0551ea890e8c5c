//! WebSocket message types.
//!
//! Defines the channel names, canonical subscription parameters, and the
//! frames exchanged over the shared connection.
//!
//! Client frames are flat JSON objects:
//!
//! ```json
//! {"action":"subscribe","channel":"orderbook","symbol":"BTCUSDT","type":"spot"}
//! {"action":"ping"}
//! ```
//!
//! Server frames carry an `action`, the `channel`, the payload under `data`
//! (or a channel-specific field such as `bids`/`asks`), an optional
//! `timestamp`, and the echoed subscription parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::error::{DecodeError, WsError};

/// Streaming channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Order book snapshots.
    OrderBook,
    /// Recent trades.
    Trades,
    /// Ticker list.
    Ticker,
    /// OHLCV candles.
    Candles,
    /// User orders (requires a listen key).
    Orders,
    /// User balances (requires a listen key).
    Balances,
}

impl ChannelKind {
    /// All channels.
    pub const ALL: [Self; 6] = [
        Self::OrderBook,
        Self::Trades,
        Self::Ticker,
        Self::Candles,
        Self::Orders,
        Self::Balances,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderBook => "orderbook",
            Self::Trades => "trades",
            Self::Ticker => "ticker",
            Self::Candles => "candles",
            Self::Orders => "orders",
            Self::Balances => "balances",
        }
    }

    /// Returns true if the channel carries per-user data.
    #[must_use]
    pub const fn is_user_scoped(&self) -> bool {
        matches!(self, Self::Orders | Self::Balances)
    }

    /// Parameters the server echoes on data frames and that select which
    /// subscriptions a frame belongs to.
    #[must_use]
    pub const fn route_fields(&self) -> &'static [&'static str] {
        match self {
            Self::OrderBook => &["symbol", "type"],
            Self::Trades => &["symbol"],
            Self::Candles => &["symbol", "interval"],
            Self::Ticker | Self::Orders | Self::Balances => &[],
        }
    }

    /// Field that carries the payload when `data` is absent.
    #[must_use]
    pub const fn payload_field(&self) -> &'static str {
        match self {
            Self::OrderBook => "bids",
            Self::Trades => "trades",
            Self::Ticker => "tickers",
            Self::Candles => "candles",
            Self::Orders => "orders",
            Self::Balances => "balances",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orderbook" | "order_book" | "book" | "depth" => Ok(Self::OrderBook),
            "trades" | "trade" => Ok(Self::Trades),
            "ticker" | "tickers" => Ok(Self::Ticker),
            "candles" | "candle" | "kline" | "klines" => Ok(Self::Candles),
            "orders" | "order" => Ok(Self::Orders),
            "balances" | "balance" => Ok(Self::Balances),
            other => Err(WsError::Protocol(format!("unknown channel: {}", other))),
        }
    }
}

/// Canonical subscription parameters.
///
/// Keys are ordered, values trimmed, empty values dropped, `symbol`
/// upper-cased and `type` lower-cased, so equivalent parameter sets
/// compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, returning the updated set.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a parameter in canonical form.
    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        let key = key.trim();
        let value = value.as_ref().trim();
        if key.is_empty() {
            return;
        }
        if value.is_empty() {
            self.0.remove(key);
            return;
        }
        let value = match key {
            "symbol" => value.to_ascii_uppercase(),
            "type" => value.to_ascii_lowercase(),
            _ => value.to_string(),
        };
        self.0.insert(key.to_string(), value);
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns true if a frame routed with `route` belongs to a subscription
    /// holding these parameters.
    ///
    /// Only keys present on both sides are compared.
    #[must_use]
    pub fn matches(&self, route: &Params) -> bool {
        route
            .iter()
            .all(|(key, value)| self.get(key).map_or(true, |mine| mine == value))
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k.as_ref(), v);
        }
        params
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Identity of a subscription: channel plus canonical parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// Channel.
    pub channel: ChannelKind,
    /// Canonical parameters.
    pub params: Params,
}

impl SubscriptionKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(channel: ChannelKind, params: Params) -> Self {
        Self { channel, params }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.channel)
        } else {
            write!(f, "{}[{}]", self.channel, self.params)
        }
    }
}

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Start streaming a channel.
    Subscribe(SubscriptionKey),
    /// Stop streaming a channel.
    Unsubscribe(SubscriptionKey),
    /// Application heartbeat.
    Ping,
}

impl ClientFrame {
    /// Returns the action name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Ping => "ping",
        }
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(|e| WsError::Serialization(e.to_string()))
    }
}

impl Serialize for ClientFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let key = match self {
            Self::Subscribe(key) | Self::Unsubscribe(key) => Some(key),
            Self::Ping => None,
        };
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("action", self.action())?;
        if let Some(key) = key {
            map.serialize_entry("channel", key.channel.as_str())?;
            for (k, v) in key.params.iter() {
                if k != "action" && k != "channel" {
                    map.serialize_entry(k, v)?;
                }
            }
        }
        map.end()
    }
}

/// Server frame actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameAction {
    /// Full snapshot sent right after subscribing.
    #[serde(alias = "snapshot")]
    Initial,
    /// Replacement snapshot.
    Update,
    /// Replacement trade list.
    #[serde(alias = "tradeUpdate")]
    TradeUpdate,
    /// Heartbeat reply.
    Pong,
    /// Subscription acknowledged.
    Subscribed,
    /// Unsubscription acknowledged.
    Unsubscribed,
    /// Server-side error.
    Error,
    /// Any action this client does not know.
    #[serde(other)]
    Unknown,
}

impl Default for FrameAction {
    fn default() -> Self {
        Self::Update
    }
}

impl FrameAction {
    /// Returns true if the frame carries a snapshot to apply.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Initial | Self::Update | Self::TradeUpdate)
    }
}

/// A parsed server frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    /// Frame action; missing actions are treated as updates.
    #[serde(default, alias = "event")]
    pub action: FrameAction,

    /// Channel name, if sent.
    #[serde(default)]
    pub channel: Option<String>,

    /// Payload.
    #[serde(default)]
    pub data: Option<Value>,

    /// Server timestamp, informational only.
    #[serde(default)]
    pub timestamp: Option<Value>,

    /// Echoed parameters and channel-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServerFrame {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Returns the channel this frame belongs to.
    ///
    /// Falls back to the channel-specific payload fields when the frame has
    /// no usable `channel`.
    #[must_use]
    pub fn channel_kind(&self) -> Option<ChannelKind> {
        if let Some(kind) = self.channel.as_deref().and_then(|c| c.parse().ok()) {
            return Some(kind);
        }
        if self.fields.contains_key("asks") {
            return Some(ChannelKind::OrderBook);
        }
        ChannelKind::ALL
            .into_iter()
            .find(|kind| self.fields.contains_key(kind.payload_field()))
    }

    /// Returns the payload: `data` if present, otherwise the named field.
    #[must_use]
    pub fn payload(&self, field: &str) -> Option<&Value> {
        match &self.data {
            Some(Value::Null) | None => self.fields.get(field).filter(|v| !v.is_null()),
            Some(data) => Some(data),
        }
    }

    /// Returns a scalar parameter from the frame or from an object payload.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        let value = self.fields.get(name).or_else(|| match &self.data {
            Some(Value::Object(data)) => data.get(name),
            _ => None,
        })?;
        scalar_string(value)
    }

    /// Returns the error code of an error frame.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        self.lookup("code").and_then(scalar_string)
    }

    /// Returns the error message of an error frame.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.lookup("message")
            .or_else(|| self.lookup("msg"))
            .and_then(scalar_string)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| match &self.data {
            Some(Value::Object(data)) => data.get(name),
            _ => None,
        })
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
