//! HTTP client for the Tickstream REST API.
//!
//! The REST side seeds views before the live channel delivers, places and
//! cancels orders, and manages the session and listen key.
//!
//! # Example
//!
//! ```rust,ignore
//! use tickstream_sdk::client::{ClientConfig, TerminalClient};
//! use tickstream_sdk::MarketType;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TerminalClient::with_base_url("https://api.tickstream.example/v1")?;
//!
//!     let book = client.get_orderbook("BTCUSDT", MarketType::Spot, Some(20)).await?;
//!     println!("Best bid: {:?}", book.best_bid());
//!
//!     client.login("trader", "secret").await?;
//!     let balances = client.get_balances().await?;
//!     println!("{} assets", balances.len());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;

pub use auth::{AuthState, LoginRequest, Session};
pub use config::ClientConfig;
pub use error::ClientError;
pub use http::TerminalClient;
