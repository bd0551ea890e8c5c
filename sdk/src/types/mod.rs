//! Core types for the Tickstream SDK.
//!
//! This module provides the domain types shared by the REST client and the
//! streaming channels. Every snapshot type derives `Hash` so decoded
//! payloads can be fingerprinted.

pub mod balance;
pub mod book;
pub mod candle;
pub mod market;
pub mod order;
pub mod primitives;
pub mod ticker;
pub mod trade;

pub use balance::{Balance, BalanceMap};
pub use book::{BookLevel, OrderBookSnapshot, RawLevel};
pub use candle::Candle;
pub use market::SymbolInfo;
pub use order::{Order, OrderStatus, OrderType, PlaceOrderRequest};
pub use primitives::{MarketType, Price, Quantity, Side};
pub use ticker::Ticker;
pub use trade::Trade;

/// Deserializes an identifier the server may send as a string or a number.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Int(i) => i.to_string(),
        Id::Uint(u) => u.to_string(),
    })
}

/// Deserializes a timestamp the server may send as a number or a numeric
/// string.
pub(crate) fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw = string_or_number(deserializer)?;
    raw.parse::<i64>()
        .map_err(|e| D::Error::custom(format!("invalid timestamp {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
        #[serde(deserialize_with = "millis")]
        time: i64,
    }

    #[test]
    fn test_string_or_number() {
        let a: Wrapper = serde_json::from_str(r#"{"id":42,"time":"1700000000000"}"#).expect("a");
        let b: Wrapper = serde_json::from_str(r#"{"id":"42","time":1700000000000}"#).expect("b");
        assert_eq!(a.id, "42");
        assert_eq!(a.id, b.id);
        assert_eq!(a.time, b.time);
    }

    #[test]
    fn test_millis_rejects_garbage() {
        let res: Result<Wrapper, _> = serde_json::from_str(r#"{"id":1,"time":"soon"}"#);
        assert!(res.is_err());
    }
}
