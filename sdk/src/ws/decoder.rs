//! Channel decoding.
//!
//! Turns routed server frames into typed [`ChannelSnapshot`]s and
//! suppresses snapshots identical to the last one delivered.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::decoders::{
    BalancesDecoder, CandlesDecoder, OrderBookDecoder, OrdersDecoder, TickerDecoder,
    TradesDecoder,
};
use super::error::DecodeError;
use super::messages::{ChannelKind, Params, ServerFrame};
use crate::types::{BalanceMap, Candle, Order, OrderBookSnapshot, Ticker, Trade};

/// Decoded state of one channel subscription.
///
/// Every frame produces a complete replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelSnapshot {
    /// Order book.
    OrderBook(OrderBookSnapshot),
    /// Trades, newest first.
    Trades(Vec<Trade>),
    /// Tickers.
    Ticker(Vec<Ticker>),
    /// Candles, oldest first.
    Candles(Vec<Candle>),
    /// User orders.
    Orders(Vec<Order>),
    /// User balances by asset.
    Balances(BalanceMap),
}

impl ChannelSnapshot {
    /// Returns the channel this snapshot belongs to.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::OrderBook(_) => ChannelKind::OrderBook,
            Self::Trades(_) => ChannelKind::Trades,
            Self::Ticker(_) => ChannelKind::Ticker,
            Self::Candles(_) => ChannelKind::Candles,
            Self::Orders(_) => ChannelKind::Orders,
            Self::Balances(_) => ChannelKind::Balances,
        }
    }

    /// Returns true if the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::OrderBook(book) => book.is_empty(),
            Self::Trades(v) => v.is_empty(),
            Self::Ticker(v) => v.is_empty(),
            Self::Candles(v) => v.is_empty(),
            Self::Orders(v) => v.is_empty(),
            Self::Balances(m) => m.is_empty(),
        }
    }
}

/// Events delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A new snapshot for the subscription.
    Snapshot(Arc<ChannelSnapshot>),
    /// A frame for the subscription could not be decoded.
    Error(DecodeError),
}

/// Returns the content fingerprint of a snapshot.
#[must_use]
pub fn fingerprint(snapshot: &ChannelSnapshot) -> u64 {
    let mut hasher = DefaultHasher::new();
    snapshot.hash(&mut hasher);
    hasher.finish()
}

/// Last delivered snapshot of a subscription and its fingerprint.
#[derive(Debug, Default)]
pub struct SnapshotState {
    fingerprint: Option<u64>,
    current: Option<Arc<ChannelSnapshot>>,
}

impl SnapshotState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the snapshot and returns it, or returns `None` if it is
    /// identical to the current one.
    pub fn apply(&mut self, snapshot: ChannelSnapshot) -> Option<Arc<ChannelSnapshot>> {
        let fp = fingerprint(&snapshot);
        if self.fingerprint == Some(fp) {
            return None;
        }
        let snapshot = Arc::new(snapshot);
        self.fingerprint = Some(fp);
        self.current = Some(Arc::clone(&snapshot));
        Some(snapshot)
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ChannelSnapshot>> {
        self.current.clone()
    }

    /// Discards the current snapshot.
    pub fn clear(&mut self) {
        self.fingerprint = None;
        self.current = None;
    }
}

/// Decodes one channel's frames.
pub trait ChannelDecoder: Send + Sync {
    /// Channel handled by this decoder.
    fn kind(&self) -> ChannelKind;

    /// Extracts the routing parameters echoed on a frame.
    fn route(&self, frame: &ServerFrame) -> Params {
        self.kind()
            .route_fields()
            .iter()
            .filter_map(|field| frame.param(field).map(|value| (*field, value)))
            .collect()
    }

    /// Decodes a frame for a subscription holding `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is missing or has the wrong shape.
    fn decode(&self, frame: &ServerFrame, params: &Params)
        -> Result<ChannelSnapshot, DecodeError>;
}

/// Decoders keyed by channel.
pub struct DecoderTable {
    decoders: HashMap<ChannelKind, Box<dyn ChannelDecoder>>,
}

impl DecoderTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Creates a table with a decoder for every channel.
    #[must_use]
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(Box::new(OrderBookDecoder));
        table.register(Box::new(TradesDecoder));
        table.register(Box::new(TickerDecoder));
        table.register(Box::new(CandlesDecoder));
        table.register(Box::new(OrdersDecoder));
        table.register(Box::new(BalancesDecoder));
        table
    }

    /// Registers a decoder, replacing any previous one for its channel.
    pub fn register(&mut self, decoder: Box<dyn ChannelDecoder>) {
        self.decoders.insert(decoder.kind(), decoder);
    }

    /// Returns the decoder for a channel.
    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<&dyn ChannelDecoder> {
        self.decoders.get(&kind).map(Box::as_ref)
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DecoderTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("DecoderTable").field("channels", &kinds).finish()
    }
}

/// Deserializes the channel payload of a frame.
pub(crate) fn payload_as<T: DeserializeOwned>(
    frame: &ServerFrame,
    kind: ChannelKind,
) -> Result<T, DecodeError> {
    let value = frame
        .payload(kind.payload_field())
        .ok_or_else(|| DecodeError::MissingPayload {
            channel: kind.to_string(),
        })?;
    serde_json::from_value(value.clone()).map_err(|e| DecodeError::invalid(kind, e))
}

/// Reads a positive integer parameter such as `depth` or `limit`.
pub(crate) fn usize_param(params: &Params, name: &str) -> Option<usize> {
    params
        .get(name)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
}
