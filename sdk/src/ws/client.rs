//! Streaming client.
//!
//! Wires one [`ConnectionManager`] to one [`SubscriptionRegistry`] and
//! exposes typed subscription helpers. The client is constructed and torn
//! down explicitly; nothing is created lazily behind the caller's back.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use super::config::WsConfig;
use super::connection::{ConnectionManager, ConnectionStatus};
use super::error::WsError;
use super::listen_key::{ListenKeyApi, ListenKeyManager, ListenKeyStore};
use super::messages::{ChannelKind, Params};
use super::metrics::StreamMetrics;
use super::network::NetworkMonitor;
use super::reconciler::{spawn_synced, SnapshotContent, SyncedView, DEFAULT_REST_TIMEOUT};
use super::registry::{Listener, SubscriptionRegistry};
use super::transport::FrameSink;
use crate::types::MarketType;

/// Client for the shared streaming connection.
pub struct StreamClient {
    connection: Arc<ConnectionManager>,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<StreamMetrics>,
    network: NetworkMonitor,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("connection", &self.connection)
            .field("registry", &self.registry)
            .finish()
    }
}

impl StreamClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WsConfig) -> Result<Self, WsError> {
        Self::with_network(config, NetworkMonitor::new())
    }

    /// Creates a client with the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_url(url: impl Into<String>) -> Result<Self, WsError> {
        Self::new(WsConfig::new(url))
    }

    /// Creates a client that follows an externally driven network signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_network(config: WsConfig, network: NetworkMonitor) -> Result<Self, WsError> {
        let metrics = Arc::new(StreamMetrics::new());
        let connection = Arc::new(ConnectionManager::new(
            config,
            Arc::clone(&metrics),
            network.clone(),
        )?);
        let registry = Arc::new(SubscriptionRegistry::new(
            connection.clone(),
            Arc::clone(&metrics),
        ));
        let sink: Arc<dyn FrameSink> = registry.clone();
        connection.set_frame_sink(Arc::downgrade(&sink));

        Ok(Self {
            connection,
            registry,
            metrics,
            network,
        })
    }

    /// Returns the connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Returns the subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// Returns the network monitor.
    #[must_use]
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Returns the connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Returns a receiver for connection status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Subscribes to a channel with arbitrary parameters.
    pub fn subscribe(&self, channel: ChannelKind, params: Params) -> Listener {
        if channel.is_user_scoped() && self.connection.listen_key().is_none() {
            warn!(channel = %channel, "user channel subscribed without a listen key");
        }
        self.registry.subscribe(channel, params)
    }

    /// Subscribes to the order book of a symbol.
    pub fn subscribe_orderbook(&self, symbol: &str, market_type: MarketType) -> Listener {
        self.subscribe(
            ChannelKind::OrderBook,
            Params::new()
                .with("symbol", symbol)
                .with("type", market_type.as_str()),
        )
    }

    /// Subscribes to recent trades of a symbol.
    pub fn subscribe_trades(&self, symbol: &str) -> Listener {
        self.subscribe(ChannelKind::Trades, Params::new().with("symbol", symbol))
    }

    /// Subscribes to tickers, optionally narrowed to one symbol.
    pub fn subscribe_ticker(&self, symbol: Option<&str>) -> Listener {
        let mut params = Params::new();
        if let Some(symbol) = symbol {
            params.insert("symbol", symbol);
        }
        self.subscribe(ChannelKind::Ticker, params)
    }

    /// Subscribes to candles of a symbol at an interval such as `1m`.
    pub fn subscribe_candles(&self, symbol: &str, interval: &str) -> Listener {
        self.subscribe(
            ChannelKind::Candles,
            Params::new()
                .with("symbol", symbol)
                .with("interval", interval),
        )
    }

    /// Subscribes to the user's orders, optionally narrowed to one symbol.
    pub fn subscribe_orders(&self, symbol: Option<&str>) -> Listener {
        let mut params = Params::new();
        if let Some(symbol) = symbol {
            params.insert("symbol", symbol);
        }
        self.subscribe(ChannelKind::Orders, params)
    }

    /// Subscribes to the user's balances.
    pub fn subscribe_balances(&self) -> Listener {
        self.subscribe(ChannelKind::Balances, Params::new())
    }

    /// Subscribes and seeds the view with a REST snapshot.
    pub fn synced<T, F, E>(&self, channel: ChannelKind, params: Params, rest: F) -> SyncedView<T>
    where
        T: SnapshotContent,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.synced_with_timeout(channel, params, rest, DEFAULT_REST_TIMEOUT)
    }

    /// Like [`synced`](Self::synced) with an explicit REST timeout.
    pub fn synced_with_timeout<T, F, E>(
        &self,
        channel: ChannelKind,
        params: Params,
        rest: F,
        rest_timeout: Duration,
    ) -> SyncedView<T>
    where
        T: SnapshotContent,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let listener = self.subscribe(channel, params);
        spawn_synced(rest, listener, self.watch_status(), rest_timeout)
    }

    /// Creates a listen key manager bound to this client's connection.
    #[must_use]
    pub fn listen_key_manager(
        &self,
        api: Arc<dyn ListenKeyApi>,
        store: Arc<dyn ListenKeyStore>,
    ) -> ListenKeyManager {
        ListenKeyManager::new(api, store, self.connection.clone())
    }

    /// Drops every subscription and closes the connection.
    pub async fn shutdown(&self) {
        info!("shutting down stream client");
        self.registry.close_all();
        self.connection.close().await;
    }
}
