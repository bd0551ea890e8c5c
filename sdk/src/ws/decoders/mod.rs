//! Per-channel decoders.
//!
//! Each decoder reads the frame's payload (`data`, or the channel's own
//! field), applies the subscription's client-side parameters, and returns
//! a complete snapshot.

mod balances;
mod candles;
mod orderbook;
mod orders;
mod ticker;
mod trades;

pub use balances::BalancesDecoder;
pub use candles::CandlesDecoder;
pub use orderbook::OrderBookDecoder;
pub use orders::OrdersDecoder;
pub use ticker::TickerDecoder;
pub use trades::TradesDecoder;
