//! Primitive types for the Tickstream SDK.
//!
//! Provides type-safe wrappers for prices, quantities, order sides and
//! market types.

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// A price value in quote currency.
///
/// Prices are exact decimals. The server may send them as JSON numbers or
/// strings; both forms deserialize to the same value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Creates a new price.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Creates a price from an integer amount.
    #[must_use]
    pub fn from_int(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Returns zero price.
    #[must_use]
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns true if the price is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::Overflow` if the result cannot be represented.
    pub fn checked_sub(self, other: Self) -> Result<Self, SdkError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(SdkError::Overflow)
    }

    /// Checked multiplication by a quantity, yielding a notional value.
    ///
    /// # Errors
    ///
    /// Returns `SdkError::Overflow` if the result cannot be represented.
    pub fn checked_notional(self, quantity: Quantity) -> Result<Decimal, SdkError> {
        self.0.checked_mul(quantity.0).ok_or(SdkError::Overflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| SdkError::InvalidPrice(format!("{}: {}", s, e)))
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

/// A quantity value in base currency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Creates a new quantity.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Creates a quantity from an integer amount.
    #[must_use]
    pub fn from_int(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Returns zero quantity.
    #[must_use]
    pub const fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns true if the quantity is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the quantity is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Saturating addition.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl FromStr for Quantity {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self)
            .map_err(|e| SdkError::InvalidQuantity(format!("{}: {}", s, e)))
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.saturating_sub(other)
    }
}

impl Mul<Decimal> for Quantity {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        Self(self.0.saturating_mul(factor))
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side.
    #[serde(alias = "BUY", alias = "Buy", alias = "bid")]
    Buy,
    /// Sell side.
    #[serde(alias = "SELL", alias = "Sell", alias = "ask")]
    Sell,
}

impl Side {
    /// Returns true if this is the buy side.
    #[must_use]
    pub const fn is_buy(&self) -> bool {
        matches!(self, Self::Buy)
    }

    /// Returns true if this is the sell side.
    #[must_use]
    pub const fn is_sell(&self) -> bool {
        matches!(self, Self::Sell)
    }

    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Market type a symbol trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Spot market.
    #[default]
    Spot,
    /// Perpetual futures market.
    Futures,
}

impl MarketType {
    /// Returns the wire name of the market type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Futures => "futures",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "futures" | "perp" | "perpetual" => Ok(Self::Futures),
            other => Err(SdkError::InvalidMarketType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal")
    }

    #[test]
    fn test_price_from_int() {
        let price = Price::from_int(1000);
        assert_eq!(price.value(), Decimal::from(1000));
    }

    #[test]
    fn test_price_zero() {
        let price = Price::zero();
        assert!(price.is_zero());
        assert_eq!(price, Price::default());
    }

    #[test]
    fn test_price_deserialize_number_and_string() {
        let from_number: Price = serde_json::from_str("101.5").expect("number");
        let from_string: Price = serde_json::from_str("\"101.5\"").expect("string");
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.value(), dec("101.5"));
    }

    #[test]
    fn test_price_from_str_invalid() {
        let err = Price::from_str("abc").expect_err("invalid");
        assert!(err.to_string().starts_with("invalid price"));
    }

    #[test]
    fn test_price_display_normalized() {
        assert_eq!(Price::new(dec("101.500")).to_string(), "101.5");
    }

    #[test]
    fn test_price_checked_notional() {
        let price = Price::new(dec("2.5"));
        let qty = Quantity::from_int(4);
        assert_eq!(price.checked_notional(qty), Ok(Decimal::from(10)));
    }

    #[test]
    fn test_quantity_ops() {
        let a = Quantity::new(dec("1.5"));
        let b = Quantity::new(dec("0.5"));
        assert_eq!((a + b).value(), Decimal::from(2));
        assert_eq!((a - b).value(), Decimal::from(1));
        assert!(!a.is_negative());
        assert!((b - a).is_negative());
    }

    #[test]
    fn test_side_aliases() {
        let buy: Side = serde_json::from_str("\"BUY\"").expect("buy");
        let bid: Side = serde_json::from_str("\"bid\"").expect("bid");
        let sell: Side = serde_json::from_str("\"sell\"").expect("sell");
        assert_eq!(buy, Side::Buy);
        assert_eq!(bid, Side::Buy);
        assert_eq!(sell, Side::Sell);
        assert_eq!(buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_market_type_parse() {
        assert_eq!(MarketType::from_str("Spot"), Ok(MarketType::Spot));
        assert_eq!(MarketType::from_str("perp"), Ok(MarketType::Futures));
        assert!(MarketType::from_str("options").is_err());
        assert_eq!(MarketType::Futures.to_string(), "futures");
    }
}
