//! Subscription registry.
//!
//! Maps each channel-plus-parameters key to the listeners interested in it,
//! reference-counts them, and sends exactly one subscribe frame when a key
//! gains its first listener and one unsubscribe frame when it loses its
//! last. Inbound frames are routed to matching keys, decoded, deduplicated
//! by fingerprint and fanned out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::decoder::{DecoderTable, SnapshotState, StreamEvent};
use super::error::WsError;
use super::messages::{ChannelKind, ClientFrame, FrameAction, Params, ServerFrame, SubscriptionKey};
use super::metrics::StreamMetrics;
use super::transport::{FrameSink, Transport};

/// Last control action sent for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// A subscribe frame.
    Subscribe,
    /// An unsubscribe frame.
    Unsubscribe,
}

struct Entry {
    listeners: HashMap<u64, mpsc::UnboundedSender<StreamEvent>>,
    last_action: Option<ControlAction>,
    subscribed_epoch: Option<u64>,
    snapshot: SnapshotState,
}

impl Entry {
    fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            last_action: None,
            subscribed_epoch: None,
            snapshot: SnapshotState::new(),
        }
    }

    fn broadcast(&self, event: &StreamEvent) {
        for tx in self.listeners.values() {
            let _ = tx.send(event.clone());
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<SubscriptionKey, Entry>,
    next_listener_id: u64,
}

/// Reference-counted subscriptions over a shared [`Transport`].
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    decoders: DecoderTable,
    metrics: Arc<StreamMetrics>,
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("decoders", &self.decoders)
            .field("subscriptions", &self.lock().entries.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates a registry with the standard decoders.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<StreamMetrics>) -> Self {
        Self::with_decoders(transport, DecoderTable::standard(), metrics)
    }

    /// Creates a registry with a custom decoder table.
    #[must_use]
    pub fn with_decoders(
        transport: Arc<dyn Transport>,
        decoders: DecoderTable,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            transport,
            decoders,
            metrics,
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a listener for `channel` with `params`.
    ///
    /// The first listener of a key triggers a connection attempt and a
    /// subscribe frame. A later listener immediately receives the current
    /// snapshot, if any.
    pub fn subscribe(self: &Arc<Self>, channel: ChannelKind, params: Params) -> Listener {
        let key = SubscriptionKey::new(channel, params);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.lock();
        let id = state.next_listener_id;
        state.next_listener_id += 1;

        let first = !state.entries.contains_key(&key);
        let entry = state.entries.entry(key.clone()).or_insert_with(Entry::new);
        if let Some(current) = entry.snapshot.current() {
            let _ = tx.send(StreamEvent::Snapshot(current));
        }
        entry.listeners.insert(id, tx);

        if first {
            debug!(channel = %key, "first listener, subscribing");
            self.transport.ensure_connected();
            self.send_subscribe(&key, entry);
        } else {
            trace!(channel = %key, listeners = entry.listeners.len(), "listener added");
        }
        drop(state);

        Listener {
            id,
            key,
            rx,
            registry: Arc::downgrade(self),
            active: true,
        }
    }

    fn send_subscribe(&self, key: &SubscriptionKey, entry: &mut Entry) {
        match self.transport.send(&ClientFrame::Subscribe(key.clone())) {
            Ok(epoch) => {
                entry.subscribed_epoch = Some(epoch);
                entry.last_action = Some(ControlAction::Subscribe);
                self.metrics.record_subscribe_sent();
            }
            Err(WsError::NotConnected) => {
                debug!(channel = %key, "not connected, subscribe deferred to open");
            }
            Err(e) => {
                warn!(channel = %key, error = %e, "failed to send subscribe");
            }
        }
    }

    fn release(&self, key: &SubscriptionKey, id: u64) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        if entry.listeners.remove(&id).is_none() || !entry.listeners.is_empty() {
            return;
        }
        state.entries.remove(key);

        debug!(channel = %key, "last listener gone, unsubscribing");
        match self.transport.send(&ClientFrame::Unsubscribe(key.clone())) {
            Ok(_) => self.metrics.record_unsubscribe_sent(),
            Err(WsError::NotConnected) => {
                debug!(channel = %key, "not connected, nothing to unsubscribe");
            }
            Err(e) => warn!(channel = %key, error = %e, "failed to send unsubscribe"),
        }
    }

    /// Returns the keys with at least one listener.
    #[must_use]
    pub fn active_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of listeners for a key.
    #[must_use]
    pub fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Returns the last control action sent for a key.
    #[must_use]
    pub fn last_action(&self, key: &SubscriptionKey) -> Option<ControlAction> {
        self.lock().entries.get(key).and_then(|e| e.last_action)
    }

    /// Drops every subscription. Listeners see their stream end.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.lock().entries.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "closing all subscriptions");
        }
    }

    fn dispatch(&self, frame: &ServerFrame) {
        let Some(kind) = frame.channel_kind() else {
            self.metrics.record_unroutable();
            warn!(channel = ?frame.channel, "frame has no known channel, dropping");
            return;
        };
        let Some(decoder) = self.decoders.get(kind) else {
            self.metrics.record_unroutable();
            warn!(channel = %kind, "no decoder for channel, dropping");
            return;
        };
        let route = decoder.route(frame);

        let mut state = self.lock();
        let candidates = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                key.channel == kind && !entry.listeners.is_empty() && key.params.matches(&route)
            })
            .map(|(key, _)| key);
        if let Some(field) = ambiguous_field(kind, &route, candidates) {
            drop(state);
            self.metrics.record_unroutable();
            warn!(channel = %kind, field, "frame omits a field that separates subscriptions, dropping");
            return;
        }

        let mut matched = false;
        let mut malformed = false;
        for (key, entry) in state.entries.iter_mut() {
            if key.channel != kind || entry.listeners.is_empty() || !key.params.matches(&route) {
                continue;
            }
            matched = true;
            match decoder.decode(frame, &key.params) {
                Ok(snapshot) => match entry.snapshot.apply(snapshot) {
                    Some(snapshot) => {
                        entry.broadcast(&StreamEvent::Snapshot(snapshot));
                        self.metrics.record_snapshot_delivered();
                    }
                    None => {
                        trace!(channel = %key, "duplicate snapshot suppressed");
                        self.metrics.record_duplicate();
                    }
                },
                Err(e) => {
                    warn!(channel = %key, error = %e, "failed to decode frame");
                    malformed = true;
                    entry.broadcast(&StreamEvent::Error(e));
                }
            }
        }
        drop(state);

        if malformed {
            self.metrics.record_malformed();
        }
        if !matched {
            self.metrics.record_unroutable();
            debug!(channel = %kind, route = %route, "no subscription for frame, dropping");
        }
    }
}

/// Returns a route field the frame omits while the matching subscriptions
/// hold different values for it.
fn ambiguous_field<'a>(
    kind: ChannelKind,
    route: &Params,
    candidates: impl Iterator<Item = &'a SubscriptionKey> + Clone,
) -> Option<&'static str> {
    kind.route_fields()
        .iter()
        .copied()
        .filter(|field| route.get(field).is_none())
        .find(|field| {
            let mut values = candidates.clone().map(|key| key.params.get(field));
            match values.next() {
                Some(first) => values.any(|value| value != first),
                None => false,
            }
        })
}

impl FrameSink for SubscriptionRegistry {
    fn on_open(&self, epoch: u64, reconnect: bool) {
        let mut state = self.lock();
        let mut resent = 0usize;
        for (key, entry) in state.entries.iter_mut() {
            if entry.listeners.is_empty() || entry.subscribed_epoch == Some(epoch) {
                continue;
            }
            self.send_subscribe(key, entry);
            resent += 1;
        }
        drop(state);

        if reconnect {
            debug!(epoch, resent, "resubscribed after reconnect");
        } else {
            debug!(epoch, resent, "subscribed on open");
        }
    }

    fn on_frame(&self, text: &str) {
        self.metrics.record_frame_received();

        let frame = match ServerFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame.action {
            FrameAction::Pong => trace!("pong"),
            FrameAction::Subscribed | FrameAction::Unsubscribed => {
                debug!(action = ?frame.action, channel = ?frame.channel, "acknowledged");
            }
            FrameAction::Error => {
                warn!(
                    channel = ?frame.channel,
                    code = ?frame.error_code(),
                    message = ?frame.error_message(),
                    "server reported an error"
                );
            }
            FrameAction::Unknown => debug!(channel = ?frame.channel, "ignoring unknown action"),
            FrameAction::Initial | FrameAction::Update | FrameAction::TradeUpdate => {
                self.dispatch(&frame);
            }
        }
    }
}

/// A consumer handle for one subscription.
///
/// Dropping the listener, or calling [`Listener::unsubscribe`], removes it
/// from the registry synchronously.
pub struct Listener {
    id: u64,
    key: SubscriptionKey,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    registry: Weak<SubscriptionRegistry>,
    active: bool,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}

impl Listener {
    /// Returns the subscription key.
    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Waits for the next event. Returns `None` once the registry is gone
    /// or has closed the subscription.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }

    /// Removes the listener from the registry.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.key, self.id);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ws::decoder::ChannelSnapshot;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Records frames instead of writing them to a socket.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) frames: Mutex<Vec<ClientFrame>>,
        pub(crate) epoch: AtomicU64,
        pub(crate) connects: AtomicUsize,
    }

    impl RecordingTransport {
        pub(crate) fn open(&self, epoch: u64) {
            self.epoch.store(epoch, Ordering::SeqCst);
        }

        pub(crate) fn close(&self) {
            self.epoch.store(0, Ordering::SeqCst);
        }

        pub(crate) fn frames(&self) -> Vec<ClientFrame> {
            self.frames.lock().expect("frames lock").clone()
        }

        pub(crate) fn count(&self, action: &str) -> usize {
            self.frames().iter().filter(|f| f.action() == action).count()
        }
    }

    impl Transport for RecordingTransport {
        fn ensure_connected(&self) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        fn send(&self, frame: &ClientFrame) -> Result<u64, WsError> {
            let epoch = self.epoch.load(Ordering::SeqCst);
            if epoch == 0 {
                return Err(WsError::NotConnected);
            }
            self.frames.lock().expect("frames lock").push(frame.clone());
            Ok(epoch)
        }
    }

    fn setup() -> (Arc<RecordingTransport>, Arc<SubscriptionRegistry>) {
        let transport = Arc::new(RecordingTransport::default());
        transport.open(1);
        let registry = Arc::new(SubscriptionRegistry::new(
            transport.clone(),
            Arc::new(StreamMetrics::new()),
        ));
        (transport, registry)
    }

    fn btc() -> Params {
        Params::new().with("symbol", "BTCUSDT").with("type", "spot")
    }

    const BOOK: &str = r#"{"action":"initial","channel":"orderbook","symbol":"BTCUSDT","type":"spot","data":{"bids":[["100","1"],["101","2"]],"asks":[["103","1"]]}}"#;

    #[test]
    fn test_subscribe_frames_follow_ref_count() {
        let (transport, registry) = setup();

        let a = registry.subscribe(ChannelKind::OrderBook, btc());
        let b = registry.subscribe(ChannelKind::OrderBook, btc());
        assert_eq!(transport.count("subscribe"), 1);
        assert_eq!(registry.ref_count(a.key()), 2);

        let key = a.key().clone();
        a.unsubscribe();
        assert_eq!(transport.count("unsubscribe"), 0);
        assert_eq!(registry.ref_count(&key), 1);

        drop(b);
        assert_eq!(transport.count("unsubscribe"), 1);
        assert_eq!(registry.ref_count(&key), 0);
        assert!(registry.active_keys().is_empty());

        let _c = registry.subscribe(ChannelKind::OrderBook, btc());
        assert_eq!(transport.count("subscribe"), 2);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_equivalent_params_share_subscription() {
        let (transport, registry) = setup();
        let _a = registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "btcusdt"));
        let _b = registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", " BTCUSDT"));
        assert_eq!(transport.count("subscribe"), 1);
        assert_eq!(registry.active_keys().len(), 1);
    }

    #[test]
    fn test_duplicate_frames_notify_once() {
        let (_transport, registry) = setup();
        let mut listener = registry.subscribe(ChannelKind::OrderBook, btc());

        registry.on_frame(BOOK);
        registry.on_frame(BOOK);

        match listener.try_recv() {
            Some(StreamEvent::Snapshot(snapshot)) => match snapshot.as_ref() {
                ChannelSnapshot::OrderBook(book) => {
                    assert_eq!(book.current_price, crate::types::Price::from_int(101));
                }
                other => panic!("unexpected snapshot {:?}", other.kind()),
            },
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert!(listener.try_recv().is_none());
        assert_eq!(registry.metrics.duplicates_suppressed(), 1);
    }

    #[test]
    fn test_late_joiner_gets_current_snapshot() {
        let (_transport, registry) = setup();
        let _first = registry.subscribe(ChannelKind::OrderBook, btc());
        registry.on_frame(BOOK);

        let mut late = registry.subscribe(ChannelKind::OrderBook, btc());
        assert!(matches!(late.try_recv(), Some(StreamEvent::Snapshot(_))));
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_snapshot_discarded_when_last_listener_leaves() {
        let (_transport, registry) = setup();
        let first = registry.subscribe(ChannelKind::OrderBook, btc());
        registry.on_frame(BOOK);
        drop(first);

        let mut again = registry.subscribe(ChannelKind::OrderBook, btc());
        assert!(again.try_recv().is_none());
        registry.on_frame(BOOK);
        assert!(matches!(again.try_recv(), Some(StreamEvent::Snapshot(_))));
    }

    #[test]
    fn test_routing_by_symbol() {
        let (_transport, registry) = setup();
        let mut btc_trades =
            registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "BTCUSDT"));
        let mut eth_trades =
            registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "ETHUSDT"));

        registry.on_frame(
            r#"{"action":"trade_update","channel":"trades","symbol":"ETHUSDT","data":[{"id":1,"price":"10","quantity":"1","time":1}]}"#,
        );

        assert!(btc_trades.try_recv().is_none());
        assert!(matches!(eth_trades.try_recv(), Some(StreamEvent::Snapshot(_))));
    }

    #[test]
    fn test_frame_without_symbol_not_fanned_out_across_symbols() {
        let (_transport, registry) = setup();
        let mut btc_trades =
            registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "BTCUSDT"));
        let mut eth_trades =
            registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "ETHUSDT"));

        let anonymous = r#"{"action":"trade_update","channel":"trades","data":[{"id":1,"price":"10","quantity":"1","time":1}]}"#;
        registry.on_frame(anonymous);

        assert!(btc_trades.try_recv().is_none());
        assert!(eth_trades.try_recv().is_none());
        assert_eq!(registry.metrics.unroutable_frames(), 1);

        drop(eth_trades);
        registry.on_frame(anonymous);
        assert!(matches!(btc_trades.try_recv(), Some(StreamEvent::Snapshot(_))));
    }

    #[test]
    fn test_frame_without_symbol_shared_by_depth_variants() {
        let (_transport, registry) = setup();
        let mut shallow = registry.subscribe(ChannelKind::OrderBook, btc().with("depth", "1"));
        let mut deep = registry.subscribe(ChannelKind::OrderBook, btc().with("depth", "5"));

        registry.on_frame(
            r#"{"action":"update","channel":"orderbook","data":{"bids":[["100","1"],["99","1"]],"asks":[]}}"#,
        );

        assert!(matches!(shallow.try_recv(), Some(StreamEvent::Snapshot(_))));
        assert!(matches!(deep.try_recv(), Some(StreamEvent::Snapshot(_))));
    }

    #[test]
    fn test_malformed_frame_reports_error() {
        let (_transport, registry) = setup();
        let mut listener = registry.subscribe(ChannelKind::Trades, Params::new().with("symbol", "BTCUSDT"));

        registry.on_frame(r#"{"action":"update","channel":"trades","symbol":"BTCUSDT","data":{"oops":true}}"#);
        assert!(matches!(listener.try_recv(), Some(StreamEvent::Error(_))));

        registry.on_frame("{not json");
        assert!(listener.try_recv().is_none());
        assert_eq!(registry.metrics.malformed_frames(), 2);
    }

    #[test]
    fn test_oversized_book_levels_still_deliver() {
        let (_transport, registry) = setup();
        let mut listener = registry.subscribe(ChannelKind::OrderBook, btc());

        registry.on_frame(
            r#"{"action":"update","channel":"orderbook","symbol":"BTCUSDT","data":{"bids":[["100","1000000000000000000000000000"]],"asks":[]}}"#,
        );

        match listener.try_recv() {
            Some(StreamEvent::Snapshot(snapshot)) => match snapshot.as_ref() {
                ChannelSnapshot::OrderBook(book) => {
                    assert_eq!(book.bids[0].percentage, rust_decimal::Decimal::ONE_HUNDRED);
                }
                other => panic!("unexpected snapshot {:?}", other.kind()),
            },
            other => panic!("expected snapshot, got {:?}", other),
        }
        registry.on_frame(BOOK);
        assert!(matches!(listener.try_recv(), Some(StreamEvent::Snapshot(_))));
    }

    #[test]
    fn test_unroutable_and_control_frames_ignored() {
        let (_transport, registry) = setup();
        let mut listener = registry.subscribe(ChannelKind::Ticker, Params::new());

        registry.on_frame(r#"{"action":"pong"}"#);
        registry.on_frame(r#"{"action":"subscribed","channel":"ticker"}"#);
        registry.on_frame(r#"{"action":"error","code":400,"message":"bad"}"#);
        registry.on_frame(r#"{"action":"update","channel":"news","data":[]}"#);
        registry.on_frame(r#"{"action":"update","channel":"candles","symbol":"BTCUSDT","data":[]}"#);

        assert!(listener.try_recv().is_none());
        assert_eq!(registry.metrics.unroutable_frames(), 2);
        assert_eq!(registry.metrics.frames_received(), 5);
    }

    #[test]
    fn test_on_open_resubscribes_once_per_key() {
        let (transport, registry) = setup();
        transport.close();

        let _a = registry.subscribe(ChannelKind::OrderBook, btc());
        let _b = registry.subscribe(ChannelKind::OrderBook, btc());
        let _c = registry.subscribe(ChannelKind::Balances, Params::new());
        assert_eq!(transport.count("subscribe"), 0);

        transport.open(1);
        registry.on_open(1, false);
        assert_eq!(transport.count("subscribe"), 2);

        registry.on_open(1, false);
        assert_eq!(transport.count("subscribe"), 2);

        transport.open(2);
        registry.on_open(2, true);
        assert_eq!(transport.count("subscribe"), 4);
    }

    #[test]
    fn test_close_all_ends_streams() {
        let (_transport, registry) = setup();
        let mut listener = registry.subscribe(ChannelKind::Orders, Params::new());
        registry.close_all();
        assert!(registry.active_keys().is_empty());
        assert!(tokio_test::block_on(listener.recv()).is_none());
    }
}
