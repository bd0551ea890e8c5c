//! Real-time streaming over one shared WebSocket.
//!
//! - [`ConnectionManager`] owns the socket, heartbeats, staleness checks
//!   and reconnects with backoff.
//! - [`SubscriptionRegistry`] reference-counts channel subscriptions and
//!   routes frames to typed listeners.
//! - [`decoders`] turn frames into [`ChannelSnapshot`]s; identical
//!   snapshots are suppressed by fingerprint.
//! - [`reconciler`] merges a REST snapshot with the live channel.
//! - [`listen_key`] keeps the credential for user channels fresh.
//!
//! # Example
//!
//! ```rust,ignore
//! use tickstream_sdk::ws::{StreamClient, StreamEvent, WsConfig};
//! use tickstream_sdk::MarketType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::new(WsConfig::new("wss://stream.tickstream.example/ws"))?;
//!
//!     let mut book = client.subscribe_orderbook("BTCUSDT", MarketType::Spot);
//!     while let Some(event) = book.recv().await {
//!         if let StreamEvent::Snapshot(snapshot) = event {
//!             println!("{:?}", snapshot);
//!         }
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod decoders;
pub mod error;
pub mod listen_key;
pub mod messages;
pub mod metrics;
pub mod network;
pub mod reconciler;
pub mod registry;
pub mod transport;

pub use backoff::Backoff;
pub use client::StreamClient;
pub use config::WsConfig;
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use decoder::{ChannelDecoder, ChannelSnapshot, DecoderTable, SnapshotState, StreamEvent};
pub use error::{DecodeError, WsError};
pub use listen_key::{
    FileListenKeyStore, ListenKey, ListenKeyApi, ListenKeyConsumer, ListenKeyGrant,
    ListenKeyManager, ListenKeyStore, MemoryListenKeyStore,
};
pub use messages::{ChannelKind, ClientFrame, FrameAction, Params, ServerFrame, SubscriptionKey};
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
pub use network::NetworkMonitor;
pub use reconciler::{
    spawn_synced, Reconciled, SnapshotContent, SnapshotSource, SyncedState, SyncedView,
};
pub use registry::{ControlAction, Listener, SubscriptionRegistry};
pub use transport::{FrameSink, Transport};
