//! Order book types for the Tickstream SDK.
//!
//! Provides raw wire levels and the display-ready order book snapshot.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::primitives::{Price, Quantity, Side};

/// A price level as sent by the server.
///
/// Accepts both `{"price": .., "quantity": ..}` objects and `[price, quantity]`
/// pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawLevelRepr")]
pub struct RawLevel {
    /// Price of the level.
    pub price: Price,

    /// Quantity resting at the level.
    pub quantity: Quantity,
}

impl RawLevel {
    /// Creates a new raw level.
    #[must_use]
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevelRepr {
    Object {
        price: Price,
        #[serde(alias = "qty", alias = "amount", alias = "size")]
        quantity: Quantity,
    },
    Pair(Price, Quantity),
}

impl From<RawLevelRepr> for RawLevel {
    fn from(repr: RawLevelRepr) -> Self {
        match repr {
            RawLevelRepr::Object { price, quantity } | RawLevelRepr::Pair(price, quantity) => {
                Self { price, quantity }
            }
        }
    }
}

/// A display level in the order book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevel {
    /// Price of the level.
    pub price: Price,

    /// Quantity resting at the level.
    pub quantity: Quantity,

    /// Cumulative quantity from the top of the book down to this level.
    pub total: Quantity,

    /// Cumulative quantity as a percentage of the side's deepest total.
    pub percentage: Decimal,
}

impl fmt::Display for BookLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} (total {}, {}%)",
            self.quantity, self.price, self.total, self.percentage
        )
    }
}

/// Order book snapshot.
///
/// Bids are sorted by price descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookSnapshot {
    /// Bid levels.
    pub bids: Vec<BookLevel>,

    /// Ask levels.
    pub asks: Vec<BookLevel>,

    /// Best bid if any, else lowest ask, else zero. Display only.
    pub current_price: Price,
}

impl OrderBookSnapshot {
    /// Builds a snapshot from unsorted raw levels.
    ///
    /// Levels with a non-positive quantity are dropped and levels sharing a
    /// price are merged. `depth` truncates each side after sorting.
    #[must_use]
    pub fn from_levels(bids: &[RawLevel], asks: &[RawLevel], depth: Option<usize>) -> Self {
        let bids = build_side(bids, Side::Buy, depth);
        let asks = build_side(asks, Side::Sell, depth);

        let current_price = bids
            .first()
            .or_else(|| asks.first())
            .map(|l| l.price)
            .unwrap_or_default();

        Self {
            bids,
            asks,
            current_price,
        }
    }

    /// Returns the best bid price.
    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// Returns the best ask price.
    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// Returns the spread.
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Returns the midpoint price.
    #[must_use]
    pub fn midpoint(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                let (bid, ask) = (bid.value(), ask.value());
                let mid = match bid.checked_add(ask) {
                    Some(sum) => sum / Decimal::TWO,
                    None => bid / Decimal::TWO + ask / Decimal::TWO,
                };
                Some(Price::new(mid))
            }
            _ => None,
        }
    }

    /// Returns true if the book has no levels on either side.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Returns the level at a specific price on the given side.
    #[must_use]
    pub fn level_at(&self, side: Side, price: Price) -> Option<&BookLevel> {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.iter().find(|l| l.price == price)
    }
}

impl fmt::Display for OrderBookSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OrderBook (current: {})", self.current_price)?;
        writeln!(f, "  Asks:")?;
        for level in self.asks.iter().take(5).rev() {
            writeln!(f, "    {}", level)?;
        }
        writeln!(f, "  ---")?;
        writeln!(f, "  Bids:")?;
        for level in self.bids.iter().take(5) {
            writeln!(f, "    {}", level)?;
        }
        Ok(())
    }
}

fn build_side(levels: &[RawLevel], side: Side, depth: Option<usize>) -> Vec<BookLevel> {
    let mut merged: BTreeMap<Price, Quantity> = BTreeMap::new();
    for level in levels {
        if level.quantity.is_zero() || level.quantity.is_negative() {
            continue;
        }
        let entry = merged.entry(level.price).or_default();
        *entry = *entry + level.quantity;
    }

    let ordered: Vec<(Price, Quantity)> = match side {
        Side::Buy => merged.into_iter().rev().collect(),
        Side::Sell => merged.into_iter().collect(),
    };
    let limit = depth.unwrap_or(usize::MAX);

    let mut total = Quantity::zero();
    let mut out: Vec<BookLevel> = ordered
        .into_iter()
        .take(limit)
        .map(|(price, quantity)| {
            total = total + quantity;
            BookLevel {
                price,
                quantity,
                total,
                percentage: Decimal::ZERO,
            }
        })
        .collect();

    // Divide first: totals never exceed the deepest total, so the ratio stays within 1.
    let max_total = total.value();
    if !max_total.is_zero() {
        for level in &mut out {
            level.percentage = level
                .total
                .value()
                .checked_div(max_total)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .map_or(Decimal::ONE_HUNDRED, |pct| pct.round_dp(2));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: i64, qty: i64) -> RawLevel {
        RawLevel::new(Price::from_int(price), Quantity::from_int(qty))
    }

    #[test]
    fn test_raw_level_object_and_pair() {
        let obj: RawLevel = serde_json::from_str(r#"{"price":"101.5","quantity":2}"#).expect("obj");
        let pair: RawLevel = serde_json::from_str(r#"["101.5","2"]"#).expect("pair");
        assert_eq!(obj, pair);
        let qty: RawLevel = serde_json::from_str(r#"{"price":1,"qty":3}"#).expect("qty alias");
        assert_eq!(qty.quantity, Quantity::from_int(3));
    }

    #[test]
    fn test_current_price_best_bid() {
        let book = OrderBookSnapshot::from_levels(
            &[level(101, 2), level(100, 1)],
            &[level(102, 1), level(103, 2)],
            None,
        );
        assert_eq!(book.current_price, Price::from_int(101));
        assert_eq!(book.best_bid(), Some(Price::from_int(101)));
        assert_eq!(book.best_ask(), Some(Price::from_int(102)));
    }

    #[test]
    fn test_current_price_lowest_ask_when_no_bids() {
        let book = OrderBookSnapshot::from_levels(&[], &[level(103, 2), level(102, 1)], None);
        assert_eq!(book.current_price, Price::from_int(102));
        let prices: Vec<Price> = book.asks.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![Price::from_int(102), Price::from_int(103)]);
    }

    #[test]
    fn test_current_price_zero_when_empty() {
        let book = OrderBookSnapshot::from_levels(&[], &[], None);
        assert!(book.is_empty());
        assert!(book.current_price.is_zero());
    }

    #[test]
    fn test_bids_sorted_descending() {
        let book =
            OrderBookSnapshot::from_levels(&[level(99, 1), level(101, 1), level(100, 1)], &[], None);
        let prices: Vec<Price> = book.bids.iter().map(|l| l.price).collect();
        assert_eq!(
            prices,
            vec![Price::from_int(101), Price::from_int(100), Price::from_int(99)]
        );
    }

    #[test]
    fn test_totals_and_percentages() {
        let book = OrderBookSnapshot::from_levels(&[level(101, 1), level(100, 3)], &[], None);
        assert_eq!(book.bids[0].total, Quantity::from_int(1));
        assert_eq!(book.bids[1].total, Quantity::from_int(4));
        assert_eq!(book.bids[0].percentage, Decimal::from(25));
        assert_eq!(book.bids[1].percentage, Decimal::from(100));
    }

    #[test]
    fn test_zero_levels_dropped_and_duplicates_merged() {
        let book = OrderBookSnapshot::from_levels(
            &[level(100, 0), level(99, 1), level(99, 2)],
            &[],
            None,
        );
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].quantity, Quantity::from_int(3));
    }

    #[test]
    fn test_depth_truncates() {
        let book = OrderBookSnapshot::from_levels(
            &[level(101, 1), level(100, 1), level(99, 1)],
            &[level(102, 1), level(103, 1)],
            Some(1),
        );
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids[0].percentage, Decimal::from(100));
    }

    #[test]
    fn test_spread_and_midpoint() {
        let book = OrderBookSnapshot::from_levels(&[level(100, 1)], &[level(102, 1)], None);
        assert_eq!(book.spread(), Some(Price::from_int(2)));
        assert_eq!(book.midpoint(), Some(Price::from_int(101)));
    }

    #[test]
    fn test_huge_quantities_do_not_overflow_percentages() {
        let huge: Quantity = "1000000000000000000000000000".parse().expect("qty");
        let book = OrderBookSnapshot::from_levels(
            &[
                RawLevel::new(Price::from_int(100), huge),
                RawLevel::new(Price::from_int(99), huge),
            ],
            &[],
            None,
        );
        assert_eq!(book.bids[0].percentage, Decimal::from(50));
        assert_eq!(book.bids[1].percentage, Decimal::from(100));
    }

    #[test]
    fn test_midpoint_near_decimal_max() {
        let bid: Price = "60000000000000000000000000000".parse().expect("bid");
        let ask: Price = "70000000000000000000000000000".parse().expect("ask");
        let book = OrderBookSnapshot::from_levels(
            &[RawLevel::new(bid, Quantity::from_int(1))],
            &[RawLevel::new(ask, Quantity::from_int(1))],
            None,
        );
        let expected: Price = "65000000000000000000000000000".parse().expect("mid");
        assert_eq!(book.midpoint(), Some(expected));
    }

    #[test]
    fn test_level_at() {
        let book = OrderBookSnapshot::from_levels(&[level(100, 1)], &[level(102, 4)], None);
        assert!(book.level_at(Side::Buy, Price::from_int(100)).is_some());
        assert_eq!(
            book.level_at(Side::Sell, Price::from_int(102)).map(|l| l.quantity),
            Some(Quantity::from_int(4))
        );
        assert!(book.level_at(Side::Buy, Price::from_int(99)).is_none());
    }
}
