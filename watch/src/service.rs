//! Main watch service.
//!
//! Spawns one synchronized view per requested channel and symbol and logs
//! every state change until shutdown.

use std::future::Future;
use std::sync::Arc;

use tickstream_sdk::client::{AuthState, ClientConfig, ClientError, Session, TerminalClient};
use tickstream_sdk::types::{BalanceMap, Candle, Order, OrderBookSnapshot, Ticker, Trade};
use tickstream_sdk::ws::{
    ChannelKind, ConnectionState, FileListenKeyStore, ListenKeyApi, ListenKeyStore,
    MemoryListenKeyStore, Params, SnapshotContent, StreamClient, SyncedView, WsConfig, WsError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{ConfigError, WatchConfig};

/// Errors that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Streaming client could not be built.
    #[error("stream error: {0}")]
    Stream(#[from] WsError),

    /// REST client could not be built.
    #[error("rest error: {0}")]
    Rest(#[from] ClientError),
}

/// One-line summary of a view's data for the log.
pub trait Describe {
    /// Returns the summary.
    fn describe(&self) -> String;
}

fn price_or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl Describe for OrderBookSnapshot {
    fn describe(&self) -> String {
        format!(
            "{} bids / {} asks, best bid {} best ask {}",
            self.bids.len(),
            self.asks.len(),
            price_or_dash(self.best_bid()),
            price_or_dash(self.best_ask()),
        )
    }
}

impl Describe for Vec<Trade> {
    fn describe(&self) -> String {
        match self.first() {
            Some(last) => format!("{} trades, last {} @ {}", self.len(), last.quantity, last.price),
            None => "no trades".to_string(),
        }
    }
}

impl Describe for Vec<Ticker> {
    fn describe(&self) -> String {
        match self.as_slice() {
            [] => "no tickers".to_string(),
            [ticker] => format!("{} last {}", ticker.symbol, ticker.last_price),
            many => format!("{} tickers", many.len()),
        }
    }
}

impl Describe for Vec<Candle> {
    fn describe(&self) -> String {
        match self.last() {
            Some(candle) => format!("{} candles, last close {}", self.len(), candle.close),
            None => "no candles".to_string(),
        }
    }
}

impl Describe for Vec<Order> {
    fn describe(&self) -> String {
        let open = self.iter().filter(|o| o.status.is_open()).count();
        format!("{} orders, {} open", self.len(), open)
    }
}

impl Describe for BalanceMap {
    fn describe(&self) -> String {
        let funded: Vec<String> = self
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(asset, b)| format!("{}={}", asset, b.total()))
            .collect();
        if funded.is_empty() {
            "no balances".to_string()
        } else {
            funded.join(" ")
        }
    }
}

/// The watch service.
pub struct WatchService {
    config: WatchConfig,
    stream: StreamClient,
    rest: TerminalClient,
}

impl WatchService {
    /// Creates a new watch service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WatchConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let ws_config = WsConfig::new(config.ws_url.clone())
            .with_max_reconnect_attempts(config.max_reconnects);
        let stream = StreamClient::new(ws_config)?;

        let mut rest_config = ClientConfig::new(config.api_url.clone());
        if let Some(token) = &config.access_token {
            let mut session = Session::new(token.clone());
            if let Some(refresh) = &config.refresh_token {
                session = session.with_refresh_token(refresh.clone());
            }
            rest_config = rest_config.with_session(session);
        }
        let rest = TerminalClient::new(rest_config)?;

        Ok(Self {
            config,
            stream,
            rest,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Returns the streaming client.
    #[must_use]
    pub const fn stream(&self) -> &StreamClient {
        &self.stream
    }

    /// Runs until `shutdown` resolves, then tears everything down.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!(
            symbols = ?self.config.symbols,
            channels = ?self.config.channels,
            "Watch service starting"
        );

        let mut tasks = vec![self.spawn_status_logger(), self.spawn_auth_logger()];
        if self.config.wants_user_channels() {
            tasks.push(self.start_listen_keys());
        }
        for channel in &self.config.channels {
            tasks.extend(self.spawn_channel(*channel));
        }
        info!(views = tasks.len() - 2, "Watch service started");

        shutdown.await;
        info!("Shutting down watch service");

        for task in &tasks {
            task.abort();
        }
        self.stream.shutdown().await;

        let metrics = self.stream.metrics().snapshot();
        info!(
            frames = metrics.frames_received,
            snapshots = metrics.snapshots_delivered,
            duplicates = metrics.duplicates_suppressed,
            reconnects = metrics.reconnects,
            malformed = metrics.malformed_frames,
            "Watch service stopped"
        );
    }

    fn spawn_channel(&self, channel: ChannelKind) -> Vec<JoinHandle<()>> {
        let market_type = self.config.market_type;
        let depth = self.config.depth;

        match channel {
            ChannelKind::OrderBook => self
                .config
                .symbols
                .iter()
                .map(|symbol| {
                    let rest = self.rest.clone();
                    let owned = symbol.clone();
                    let params = Params::new()
                        .with("symbol", symbol)
                        .with("type", market_type.as_str())
                        .with("depth", depth.to_string());
                    let view = self.stream.synced(channel, params, async move {
                        rest.get_orderbook(&owned, market_type, Some(depth)).await
                    });
                    spawn_logger(format!("orderbook {}", symbol), view)
                })
                .collect(),
            ChannelKind::Trades => self
                .config
                .symbols
                .iter()
                .map(|symbol| {
                    let rest = self.rest.clone();
                    let owned = symbol.clone();
                    let params = Params::new().with("symbol", symbol);
                    let view = self.stream.synced(channel, params, async move {
                        rest.get_recent_trades(&owned, None).await
                    });
                    spawn_logger(format!("trades {}", symbol), view)
                })
                .collect(),
            ChannelKind::Candles => self
                .config
                .symbols
                .iter()
                .map(|symbol| {
                    let rest = self.rest.clone();
                    let owned = symbol.clone();
                    let interval = self.config.candle_interval.clone();
                    let params = Params::new()
                        .with("symbol", symbol)
                        .with("interval", &interval);
                    let view = self.stream.synced(channel, params, async move {
                        rest.get_candles(&owned, &interval, None).await
                    });
                    spawn_logger(format!("candles {}", symbol), view)
                })
                .collect(),
            ChannelKind::Ticker if self.config.symbols.is_empty() => {
                let rest = self.rest.clone();
                let view = self.stream.synced(channel, Params::new(), async move {
                    rest.get_tickers(None).await
                });
                vec![spawn_logger("ticker".to_string(), view)]
            }
            ChannelKind::Ticker => self
                .config
                .symbols
                .iter()
                .map(|symbol| {
                    let rest = self.rest.clone();
                    let owned = symbol.clone();
                    let params = Params::new().with("symbol", symbol);
                    let view = self.stream.synced(channel, params, async move {
                        rest.get_tickers(Some(owned.as_str())).await
                    });
                    spawn_logger(format!("ticker {}", symbol), view)
                })
                .collect(),
            ChannelKind::Orders => {
                let rest = self.rest.clone();
                let view = self.stream.synced(channel, Params::new(), async move {
                    rest.get_orders(None).await
                });
                vec![spawn_logger("orders".to_string(), view)]
            }
            ChannelKind::Balances => {
                let rest = self.rest.clone();
                let view = self.stream.synced(channel, Params::new(), async move {
                    rest.get_balances().await
                });
                vec![spawn_logger("balances".to_string(), view)]
            }
        }
    }

    fn start_listen_keys(&self) -> JoinHandle<()> {
        let store: Arc<dyn ListenKeyStore> = match &self.config.listen_key_path {
            Some(path) => Arc::new(FileListenKeyStore::new(path.clone())),
            None => Arc::new(MemoryListenKeyStore::new()),
        };
        let api: Arc<dyn ListenKeyApi> = Arc::new(self.rest.clone());
        Arc::new(self.stream.listen_key_manager(api, store)).start()
    }

    fn spawn_status_logger(&self) -> JoinHandle<()> {
        let mut rx = self.stream.watch_status();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let status = rx.borrow_and_update().clone();
                match status.state {
                    ConnectionState::Open => {
                        info!(epoch = status.epoch, "Stream connected");
                    }
                    ConnectionState::Closed if status.error.is_some() => {
                        warn!(error = ?status.error, "Stream gave up reconnecting");
                    }
                    state => {
                        debug!(state = ?state, attempt = status.attempt, error = ?status.error, "Stream status");
                    }
                }
            }
        })
    }

    fn spawn_auth_logger(&self) -> JoinHandle<()> {
        let mut rx = self.rest.watch_auth();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                if state == AuthState::LoggedOut {
                    warn!("Session expired; log in again to keep user channels alive");
                } else {
                    info!("Session refreshed");
                }
            }
        })
    }
}

fn spawn_logger<T>(label: String, mut view: SyncedView<T>) -> JoinHandle<()>
where
    T: SnapshotContent + Describe,
{
    tokio::spawn(async move {
        while view.changed().await {
            let state = view.state();
            match (&state.data, &state.error) {
                (Some(data), _) => info!(
                    view = %label,
                    source = ?state.source,
                    connected = state.connected,
                    "{}",
                    data.describe()
                ),
                (None, Some(error)) => warn!(view = %label, error = %error, "No data yet"),
                (None, None) => debug!(view = %label, connected = state.connected, "Waiting for data"),
            }
        }
        debug!(view = %label, "View stopped");
    })
}
