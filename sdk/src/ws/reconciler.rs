//! REST snapshot and live push reconciliation.
//!
//! A view starts from a REST snapshot and switches to the live channel
//! once the channel delivers a non-empty snapshot. From then on the live
//! data wins, whatever order the two sources arrive in.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::connection::ConnectionStatus;
use super::decoder::{ChannelSnapshot, StreamEvent};
use super::registry::Listener;
use crate::types::{BalanceMap, Candle, Order, OrderBookSnapshot, Ticker, Trade};

/// Default timeout for the initial REST snapshot.
pub const DEFAULT_REST_TIMEOUT: Duration = Duration::from_secs(10);

/// Data a synchronized view can hold.
pub trait SnapshotContent: Clone + Send + Sync + 'static {
    /// Extracts the view's data from a channel snapshot of the right kind.
    fn from_snapshot(snapshot: &ChannelSnapshot) -> Option<Self>;

    /// Returns true if the data has at least one entry.
    fn has_entries(&self) -> bool;
}

impl SnapshotContent for OrderBookSnapshot {
    fn from_snapshot(snapshot: &ChannelSnapshot) -> Option<Self> {
        match snapshot {
            ChannelSnapshot::OrderBook(book) => Some(book.clone()),
            _ => None,
        }
    }

    fn has_entries(&self) -> bool {
        !self.is_empty()
    }
}

impl SnapshotContent for BalanceMap {
    fn from_snapshot(snapshot: &ChannelSnapshot) -> Option<Self> {
        match snapshot {
            ChannelSnapshot::Balances(map) => Some(map.clone()),
            _ => None,
        }
    }

    fn has_entries(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! list_content {
    ($ty:ty, $variant:ident) => {
        impl SnapshotContent for Vec<$ty> {
            fn from_snapshot(snapshot: &ChannelSnapshot) -> Option<Self> {
                match snapshot {
                    ChannelSnapshot::$variant(list) => Some(list.clone()),
                    _ => None,
                }
            }

            fn has_entries(&self) -> bool {
                !self.is_empty()
            }
        }
    };
}

list_content!(Trade, Trades);
list_content!(Ticker, Ticker);
list_content!(Candle, Candles);
list_content!(Order, Orders);

/// Where the current data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotSource {
    /// Nothing yet.
    None,
    /// The REST snapshot.
    Rest,
    /// The live channel.
    Live,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Rest => write!(f, "rest"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Merges a one-shot REST snapshot with live channel snapshots.
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    rest: Option<T>,
    live: Option<T>,
    live_won: bool,
    rest_failed: bool,
}

impl<T> Default for Reconciled<T> {
    fn default() -> Self {
        Self {
            rest: None,
            live: None,
            live_won: false,
            rest_failed: false,
        }
    }
}

impl<T: SnapshotContent> Reconciled<T> {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the REST snapshot.
    pub fn set_rest(&mut self, data: T) {
        self.rest = Some(data);
    }

    /// Records that the REST snapshot could not be fetched.
    pub fn rest_failed(&mut self) {
        self.rest_failed = true;
    }

    /// Returns true if the REST fetch failed.
    #[must_use]
    pub fn is_rest_failed(&self) -> bool {
        self.rest_failed
    }

    /// Records a live snapshot.
    ///
    /// The first non-empty one makes the live channel authoritative.
    pub fn apply_live(&mut self, data: T) {
        if data.has_entries() {
            self.live_won = true;
        }
        self.live = Some(data);
    }

    /// Returns the data to display.
    #[must_use]
    pub fn current(&self) -> Option<&T> {
        if self.live_won {
            self.live.as_ref()
        } else {
            self.rest.as_ref().or(self.live.as_ref())
        }
    }

    /// Returns where [`current`](Self::current) comes from.
    #[must_use]
    pub fn source(&self) -> SnapshotSource {
        if self.live_won || (self.rest.is_none() && self.live.is_some()) {
            SnapshotSource::Live
        } else if self.rest.is_some() {
            SnapshotSource::Rest
        } else {
            SnapshotSource::None
        }
    }
}

/// Published state of a synchronized view.
#[derive(Debug, Clone)]
pub struct SyncedState<T> {
    /// Current data.
    pub data: Option<T>,
    /// Where the data came from.
    pub source: SnapshotSource,
    /// Whether the shared connection is open.
    pub connected: bool,
    /// Last REST, decode or connection error.
    pub error: Option<String>,
}

impl<T> Default for SyncedState<T> {
    fn default() -> Self {
        Self {
            data: None,
            source: SnapshotSource::None,
            connected: false,
            error: None,
        }
    }
}

/// A REST-seeded, live-updated view driven by a background task.
///
/// Dropping the view stops the task and releases its listener.
pub struct SyncedView<T> {
    rx: watch::Receiver<SyncedState<T>>,
    task: JoinHandle<()>,
}

impl<T> fmt::Debug for SyncedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedView")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl<T: SnapshotContent> SyncedView<T> {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SyncedState<T> {
        self.rx.borrow().clone()
    }

    /// Returns a receiver for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncedState<T>> {
        self.rx.clone()
    }

    /// Waits for the next state change. Returns `false` once the view has
    /// stopped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> Drop for SyncedView<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a view that fetches `rest` once, with `rest_timeout`, and applies
/// every live snapshot from `listener`.
///
/// A failed or timed out REST fetch leaves the view without an initial
/// snapshot and sets `error`; it never stops the view.
pub fn spawn_synced<T, F, E>(
    rest: F,
    listener: Listener,
    status: watch::Receiver<ConnectionStatus>,
    rest_timeout: Duration,
) -> SyncedView<T>
where
    T: SnapshotContent,
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let initial = SyncedState {
        connected: status.borrow().is_open(),
        ..SyncedState::default()
    };
    let (tx, rx) = watch::channel(initial);
    let task = tokio::spawn(drive(rest, listener, status, rest_timeout, tx));
    SyncedView { rx, task }
}

async fn drive<T, F, E>(
    rest: F,
    mut listener: Listener,
    mut status: watch::Receiver<ConnectionStatus>,
    rest_timeout: Duration,
    tx: watch::Sender<SyncedState<T>>,
) where
    T: SnapshotContent,
    F: Future<Output = Result<T, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let channel = listener.key().to_string();
    let mut view = Reconciled::<T>::new();
    let mut connected = status.borrow().is_open();
    let mut error: Option<String> = None;

    let rest = tokio::time::timeout(rest_timeout, rest);
    tokio::pin!(rest);
    let mut rest_pending = true;
    let mut status_alive = true;

    loop {
        tokio::select! {
            res = &mut rest, if rest_pending => {
                rest_pending = false;
                match res {
                    Ok(Ok(data)) => {
                        debug!(channel = %channel, "REST snapshot loaded");
                        view.set_rest(data);
                    }
                    Ok(Err(e)) => {
                        warn!(channel = %channel, error = %e, "REST snapshot failed");
                        view.rest_failed();
                        error = Some(e.to_string());
                    }
                    Err(_) => {
                        warn!(channel = %channel, timeout_ms = u64::try_from(rest_timeout.as_millis()).unwrap_or(u64::MAX), "REST snapshot timed out");
                        view.rest_failed();
                        error = Some("snapshot request timed out".to_string());
                    }
                }
            }
            event = listener.recv() => match event {
                Some(StreamEvent::Snapshot(snapshot)) => match T::from_snapshot(&snapshot) {
                    Some(data) => {
                        view.apply_live(data);
                        error = None;
                    }
                    None => {
                        warn!(channel = %channel, kind = %snapshot.kind(), "snapshot of unexpected kind");
                        continue;
                    }
                },
                Some(StreamEvent::Error(e)) => error = Some(e.to_string()),
                None => break,
            },
            changed = status.changed(), if status_alive => {
                if changed.is_err() {
                    status_alive = false;
                    continue;
                }
                let current = status.borrow_and_update().clone();
                if current.is_open() == connected && current.error.is_none() {
                    continue;
                }
                connected = current.is_open();
                if let Some(e) = current.error {
                    error = Some(e);
                }
            }
        }

        tx.send_replace(SyncedState {
            data: view.current().cloned(),
            source: view.source(),
            connected,
            error: error.clone(),
        });
    }
    debug!(channel = %channel, "synced view stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Price, Quantity, RawLevel};
    use crate::ws::connection::ConnectionState;
    use crate::ws::messages::{ChannelKind, Params};
    use crate::ws::metrics::StreamMetrics;
    use crate::ws::registry::tests::RecordingTransport;
    use crate::ws::registry::SubscriptionRegistry;
    use crate::ws::transport::FrameSink;
    use std::sync::Arc;

    fn book(bid: i64) -> OrderBookSnapshot {
        OrderBookSnapshot::from_levels(
            &[RawLevel::new(Price::from_int(bid), Quantity::from_int(1))],
            &[],
            None,
        )
    }

    #[test]
    fn test_rest_after_live_keeps_live() {
        let mut view = Reconciled::new();
        view.apply_live(book(101));
        view.set_rest(book(99));
        assert_eq!(view.current(), Some(&book(101)));
        assert_eq!(view.source(), SnapshotSource::Live);
    }

    #[test]
    fn test_rest_before_live_shows_rest() {
        let mut view = Reconciled::new();
        view.set_rest(book(99));
        assert_eq!(view.current(), Some(&book(99)));
        assert_eq!(view.source(), SnapshotSource::Rest);

        view.apply_live(OrderBookSnapshot::default());
        assert_eq!(view.current(), Some(&book(99)));

        view.apply_live(book(100));
        assert_eq!(view.current(), Some(&book(100)));

        view.apply_live(OrderBookSnapshot::default());
        assert_eq!(view.current(), Some(&OrderBookSnapshot::default()));
        assert_eq!(view.source(), SnapshotSource::Live);
    }

    #[test]
    fn test_empty_view() {
        let mut view: Reconciled<Vec<Trade>> = Reconciled::new();
        assert!(view.current().is_none());
        assert_eq!(view.source(), SnapshotSource::None);
        view.rest_failed();
        assert!(view.is_rest_failed());
        view.apply_live(Vec::new());
        assert_eq!(view.source(), SnapshotSource::Live);
    }

    #[test]
    fn test_content_from_snapshot() {
        let snapshot = ChannelSnapshot::OrderBook(book(1));
        assert!(OrderBookSnapshot::from_snapshot(&snapshot).is_some());
        assert!(Vec::<Trade>::from_snapshot(&snapshot).is_none());
        assert!(!Vec::<Order>::new().has_entries());
    }

    const BOOK: &str = r#"{"action":"update","channel":"orderbook","symbol":"BTCUSDT","data":{"bids":[["101","1"]],"asks":[]}}"#;

    fn registry() -> Arc<SubscriptionRegistry> {
        let transport = Arc::new(RecordingTransport::default());
        transport.open(1);
        Arc::new(SubscriptionRegistry::new(transport, Arc::new(StreamMetrics::new())))
    }

    async fn wait_for<T: SnapshotContent>(
        view: &SyncedView<T>,
        pred: impl Fn(&SyncedState<T>) -> bool,
    ) -> SyncedState<T> {
        let mut rx = view.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| pred(s)))
            .await
            .expect("state in time")
            .expect("view running")
            .clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_synced_view_live_wins_over_late_rest() {
        let registry = registry();
        let listener = registry.subscribe(ChannelKind::OrderBook, Params::new().with("symbol", "BTCUSDT"));
        let (_status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let view = spawn_synced(
            async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, String>(book(99))
            },
            listener,
            status_rx,
            DEFAULT_REST_TIMEOUT,
        );

        tokio::task::yield_now().await;
        registry.on_frame(BOOK);
        let state = wait_for(&view, |s| s.source == SnapshotSource::Live).await;
        assert_eq!(state.data, Some(book(101)));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let state = view.state();
        assert_eq!(state.data, Some(book(101)));
        assert_eq!(state.source, SnapshotSource::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synced_view_rest_timeout_is_not_fatal() {
        let registry = registry();
        let listener = registry.subscribe(ChannelKind::OrderBook, Params::new().with("symbol", "BTCUSDT"));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

        let view = spawn_synced(
            std::future::pending::<Result<OrderBookSnapshot, String>>(),
            listener,
            status_rx,
            DEFAULT_REST_TIMEOUT,
        );

        let state = wait_for(&view, |s| s.error.is_some()).await;
        assert!(state.data.is_none());
        assert_eq!(state.source, SnapshotSource::None);

        status_tx.send_modify(|s| s.state = ConnectionState::Open);
        let state = wait_for(&view, |s| s.connected).await;
        assert!(state.connected);

        registry.on_frame(BOOK);
        let state = wait_for(&view, |s| s.data.is_some()).await;
        assert!(state.error.is_none());
    }
}
