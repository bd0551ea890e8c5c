//! Symbol metadata types for the Tickstream SDK.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::{MarketType, Price};

/// Trading symbol metadata returned by the symbols endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    /// Trading symbol (e.g. `BTCUSDT`).
    pub symbol: String,

    /// Base asset code.
    #[serde(alias = "base")]
    pub base_asset: String,

    /// Quote asset code.
    #[serde(alias = "quote")]
    pub quote_asset: String,

    /// Market the symbol trades on.
    #[serde(default, alias = "type")]
    pub market_type: MarketType,

    /// Decimal places used when displaying prices.
    #[serde(default = "default_precision")]
    pub price_precision: u32,

    /// Decimal places used when displaying quantities.
    #[serde(default = "default_precision")]
    pub quantity_precision: u32,

    /// Minimum price increment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<Decimal>,

    /// Minimum order quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<Decimal>,

    /// Trading status as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_precision() -> u32 {
    8
}

impl SymbolInfo {
    /// Returns the display name (e.g. `BTC/USDT`).
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.base_asset, self.quote_asset)
    }

    /// Rounds a price to the symbol's display precision.
    #[must_use]
    pub fn format_price(&self, price: Price) -> String {
        price.value().round_dp(self.price_precision).to_string()
    }

    /// Returns true if the symbol is open for trading.
    ///
    /// A missing status counts as trading.
    #[must_use]
    pub fn is_trading(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("trading") || s.eq_ignore_ascii_case("active"))
            .unwrap_or(true)
    }
}

impl fmt::Display for SymbolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.symbol, self.name(), self.market_type)
    }
}
