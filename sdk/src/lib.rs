//! Tickstream SDK - real-time market data synchronization for trading
//! terminals.
//!
//! One shared WebSocket carries every channel a terminal needs. Views
//! subscribe and unsubscribe freely; the SDK reference-counts channel
//! subscriptions, decodes frames into typed snapshots, suppresses
//! duplicates and reconciles the live stream with a REST snapshot.
//!
//! # Modules
//!
//! - [`types`] — Domain types shared by REST and streaming
//! - [`client`] — REST client with session refresh and listen keys
//! - [`ws`] — Shared connection, subscription registry and decoders
//!
//! # Core Types
//!
//! - [`Price`], [`Quantity`] — Type-safe numeric wrappers
//! - [`Side`], [`MarketType`] — Order side and market
//! - [`OrderBookSnapshot`], [`Trade`], [`Ticker`], [`Candle`] — Market data
//! - [`Order`], [`BalanceMap`] — User data
//!
//! # Example
//!
//! ```rust
//! use tickstream_sdk::{Price, Quantity, Side};
//!
//! let price = Price::from_int(100);
//! let quantity = Quantity::from_int(3);
//! let side = Side::Buy;
//! assert!(side.is_buy());
//! assert!(price.checked_notional(quantity).is_ok());
//! ```

pub mod client;
pub mod error;
pub mod types;
pub mod ws;

pub use client::{AuthState, ClientConfig, ClientError, Session, TerminalClient};
pub use error::SdkError;
pub use types::{
    Balance, BalanceMap, BookLevel, Candle, MarketType, Order, OrderBookSnapshot, OrderStatus,
    OrderType, PlaceOrderRequest, Price, Quantity, Side, SymbolInfo, Ticker, Trade,
};
pub use ws::{
    ChannelKind, ChannelSnapshot, ConnectionState, ConnectionStatus, Listener, Params,
    StreamClient, StreamEvent, SyncedState, SyncedView, WsConfig, WsError,
};
