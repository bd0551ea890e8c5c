//! Market ticker types for the Tickstream SDK.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::Price;

/// Rolling 24h statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    /// Trading symbol.
    #[serde(alias = "s")]
    pub symbol: String,

    /// Last traded price.
    #[serde(alias = "price", alias = "c")]
    pub last_price: Price,

    /// Absolute price change over the window.
    #[serde(default, alias = "p")]
    pub price_change: Option<Decimal>,

    /// Relative price change over the window, in percent.
    #[serde(default, alias = "P", alias = "change")]
    pub price_change_percent: Option<Decimal>,

    /// Highest price over the window.
    #[serde(default, alias = "high", alias = "h")]
    pub high_price: Option<Price>,

    /// Lowest price over the window.
    #[serde(default, alias = "low", alias = "l")]
    pub low_price: Option<Price>,

    /// Base volume over the window.
    #[serde(default, alias = "v")]
    pub volume: Option<Decimal>,

    /// Quote volume over the window.
    #[serde(default, alias = "q")]
    pub quote_volume: Option<Decimal>,
}

impl Ticker {
    /// Returns true if the price moved up over the window.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.price_change_percent
            .or(self.price_change)
            .map(|c| c.is_sign_positive() && !c.is_zero())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_deserialize_full() {
        let json = r#"{"symbol":"BTCUSDT","lastPrice":"65000.5","priceChange":"-120","priceChangePercent":"-0.18","highPrice":"66000","lowPrice":"64000","volume":"1234.5","quoteVolume":"80000000"}"#;
        let ticker: Ticker = serde_json::from_str(json).expect("deserialize");
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert!(!ticker.is_up());
        assert!(ticker.high_price.is_some());
    }

    #[test]
    fn test_ticker_deserialize_short_aliases() {
        let json = r#"{"s":"ETHUSDT","c":"3000","P":"1.5"}"#;
        let ticker: Ticker = serde_json::from_str(json).expect("deserialize");
        assert_eq!(ticker.last_price, Price::from_int(3000));
        assert!(ticker.is_up());
        assert!(ticker.volume.is_none());
    }
}
