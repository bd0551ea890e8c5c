//! Balance types for the Tickstream SDK.
//!
//! Provides per-asset user balances and the asset-keyed balance map.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::Quantity;

/// Balance of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Available for trading.
    #[serde(default, alias = "available")]
    pub free: Quantity,

    /// Held in open orders.
    #[serde(default, alias = "frozen", alias = "hold")]
    pub locked: Quantity,
}

impl Balance {
    /// Creates a new balance.
    #[must_use]
    pub fn new(free: Quantity, locked: Quantity) -> Self {
        Self { free, locked }
    }

    /// Returns the total balance (free + locked).
    #[must_use]
    pub fn total(&self) -> Quantity {
        self.free + self.locked
    }

    /// Returns true if there is any locked balance.
    #[must_use]
    pub fn has_locked(&self) -> bool {
        !self.locked.is_zero()
    }

    /// Returns true if both free and locked are zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_zero() && self.locked.is_zero()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "free {} / locked {}", self.free, self.locked)
    }
}

/// Balances keyed by upper-case asset code.
pub type BalanceMap = BTreeMap<String, Balance>;

/// A balance entry carrying its asset code, as list-shaped payloads send it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AssetBalance {
    #[serde(alias = "currency", alias = "coin")]
    pub(crate) asset: String,
    #[serde(flatten)]
    pub(crate) balance: Balance,
}

/// Balance payloads arrive either as an asset-keyed object or as a list of
/// entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum BalancePayload {
    Map(BTreeMap<String, Balance>),
    List(Vec<AssetBalance>),
}

impl BalancePayload {
    /// Normalizes the payload into a [`BalanceMap`].
    pub(crate) fn into_map(self) -> BalanceMap {
        match self {
            Self::Map(map) => map
                .into_iter()
                .map(|(asset, balance)| (asset.trim().to_ascii_uppercase(), balance))
                .collect(),
            Self::List(list) => list
                .into_iter()
                .map(|e| (e.asset.trim().to_ascii_uppercase(), e.balance))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_total() {
        let balance = Balance::new(Quantity::from_int(3), Quantity::from_int(2));
        assert_eq!(balance.total(), Quantity::from_int(5));
        assert!(balance.has_locked());
        assert!(!balance.is_empty());
        assert!(Balance::default().is_empty());
    }

    #[test]
    fn test_balance_payload_map() {
        let json = r#"{"btc":{"free":"1.5","locked":"0"},"USDT":{"available":100}}"#;
        let payload: BalancePayload = serde_json::from_str(json).expect("deserialize");
        let map = payload.into_map();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("BTC"));
        assert_eq!(map.get("USDT").map(|b| b.free), Some(Quantity::from_int(100)));
    }

    #[test]
    fn test_balance_payload_list() {
        let json = r#"[{"asset":"eth","free":"2","locked":"1"}]"#;
        let payload: BalancePayload = serde_json::from_str(json).expect("deserialize");
        let map = payload.into_map();
        assert_eq!(map.get("ETH").map(Balance::total), Some(Quantity::from_int(3)));
    }
}
