//! Trade types for the Tickstream SDK.
//!
//! Provides the public trade record shared by the recent-trades REST
//! snapshot and the trades channel.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::{Price, Quantity, Side};
use super::{millis, string_or_number};

/// An executed public trade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Trade ID.
    #[serde(deserialize_with = "string_or_number", alias = "tradeId", alias = "trade_id")]
    pub id: String,

    /// Execution price.
    pub price: Price,

    /// Executed quantity.
    #[serde(alias = "qty", alias = "amount")]
    pub quantity: Quantity,

    /// Taker side, when the server reports it directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,

    /// Whether the buyer was the maker, when the server reports it instead
    /// of a side.
    #[serde(default, alias = "is_buyer_maker", skip_serializing_if = "Option::is_none")]
    pub is_buyer_maker: Option<bool>,

    /// Execution time in milliseconds since epoch.
    #[serde(deserialize_with = "millis", alias = "timestamp", alias = "T")]
    pub time: i64,
}

impl Trade {
    /// Returns the taker side.
    ///
    /// A buyer-maker trade was initiated by a seller.
    #[must_use]
    pub fn taker_side(&self) -> Option<Side> {
        self.side.or_else(|| {
            self.is_buyer_maker
                .map(|maker| if maker { Side::Sell } else { Side::Buy })
        })
    }

    /// Returns the notional value (price * quantity).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price
            .checked_notional(self.quantity)
            .unwrap_or(Decimal::MAX)
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.taker_side() {
            Some(side) => write!(f, "Trade {} @ {} ({})", self.quantity, self.price, side),
            None => write!(f, "Trade {} @ {}", self.quantity, self.price),
        }
    }
}
