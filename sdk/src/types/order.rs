//! Order types for the Tickstream SDK.
//!
//! Provides order type, status, the user order record streamed on the
//! orders channel, and the placement request sent over REST.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::{MarketType, Price, Quantity, Side};
use super::{millis, string_or_number};
use crate::error::SdkError;

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Limit order.
    #[serde(alias = "LIMIT")]
    Limit,
    /// Market order.
    #[serde(alias = "MARKET")]
    Market,
    /// Stop-limit order.
    #[serde(alias = "STOP_LIMIT", alias = "stopLimit")]
    StopLimit,
    /// Stop-market order.
    #[serde(alias = "STOP_MARKET", alias = "stopMarket")]
    StopMarket,
}

impl OrderType {
    /// Returns true if this order type carries a limit price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
            Self::StopLimit => write!(f, "stop_limit"),
            Self::StopMarket => write!(f, "stop_market"),
        }
    }
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted but not yet acknowledged by the engine.
    #[serde(alias = "PENDING")]
    Pending,
    /// Open on the book.
    #[serde(alias = "NEW", alias = "OPEN", alias = "open")]
    New,
    /// Partially filled.
    #[serde(alias = "PARTIALLY_FILLED", alias = "partiallyFilled")]
    PartiallyFilled,
    /// Completely filled.
    #[serde(alias = "FILLED")]
    Filled,
    /// Cancelled.
    #[serde(alias = "CANCELED", alias = "CANCELLED", alias = "canceled")]
    Cancelled,
    /// Rejected.
    #[serde(alias = "REJECTED")]
    Rejected,
    /// Expired.
    #[serde(alias = "EXPIRED")]
    Expired,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Returns true if the order is still working.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::New | Self::PartiallyFilled)
    }

    /// Returns true if the order reached a final state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::New => "new",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A user order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Order ID.
    #[serde(deserialize_with = "string_or_number", alias = "id", alias = "order_id")]
    pub order_id: String,

    /// Trading symbol.
    pub symbol: String,

    /// Order side.
    pub side: Side,

    /// Order type.
    #[serde(rename = "type", alias = "orderType", alias = "order_type")]
    pub order_type: OrderType,

    /// Limit price; absent for market orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,

    /// Original quantity.
    #[serde(alias = "origQty", alias = "qty")]
    pub quantity: Quantity,

    /// Filled quantity.
    #[serde(default, alias = "executedQty", alias = "filled", alias = "filled_quantity")]
    pub filled_quantity: Quantity,

    /// Order status.
    pub status: OrderStatus,

    /// Creation time in milliseconds since epoch.
    #[serde(
        default,
        deserialize_with = "millis",
        alias = "time",
        alias = "created_at"
    )]
    pub created_at: i64,
}

impl Order {
    /// Returns the unfilled quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    /// Returns true if the order trades the given symbol.
    ///
    /// Symbols compare case-insensitively.
    #[must_use]
    pub fn is_for_symbol(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.price {
            Some(price) => write!(
                f,
                "{} {} {} {} @ {} [{}]",
                self.order_id, self.side, self.quantity, self.symbol, price, self.status
            ),
            None => write!(
                f,
                "{} {} {} {} [{}]",
                self.order_id, self.side, self.quantity, self.symbol, self.status
            ),
        }
    }
}

/// Parameters for placing a new order over REST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    /// Trading symbol.
    pub symbol: String,

    /// Order side.
    pub side: Side,

    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,

    /// Limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,

    /// Order quantity.
    pub quantity: Quantity,

    /// Market type.
    pub market_type: MarketType,

    /// Optional client-assigned ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl PlaceOrderRequest {
    /// Creates a limit order request.
    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            market_type: MarketType::Spot,
            client_order_id: None,
        }
    }

    /// Creates a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Quantity) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            market_type: MarketType::Spot,
            client_order_id: None,
        }
    }

    /// Sets the market type.
    #[must_use]
    pub fn with_market_type(mut self, market_type: MarketType) -> Self {
        self.market_type = market_type;
        self
    }

    /// Sets the client order ID.
    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty, the quantity is not
    /// positive, or a priced order type lacks a positive price.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.symbol.trim().is_empty() {
            return Err(SdkError::InvalidSymbol("symbol cannot be empty".to_string()));
        }

        if self.quantity.is_zero() || self.quantity.is_negative() {
            return Err(SdkError::InvalidQuantity(
                "quantity must be positive".to_string(),
            ));
        }

        if self.order_type.requires_price() {
            match self.price {
                Some(p) if !p.is_zero() && p.value().is_sign_positive() => {}
                _ => {
                    return Err(SdkError::InvalidPrice(format!(
                        "{} order requires a positive price",
                        self.order_type
                    )))
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_type_requires_price() {
        assert!(OrderType::Limit.requires_price());
        assert!(OrderType::StopLimit.requires_price());
        assert!(!OrderType::Market.requires_price());
    }

    #[test]
    fn test_order_status_flags() {
        assert!(OrderStatus::New.is_open());
        assert!(OrderStatus::PartiallyFilled.is_open());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(!OrderStatus::Unknown.is_open());
    }

    #[test]
    fn test_order_status_aliases() {
        let s: OrderStatus = serde_json::from_str("\"PARTIALLY_FILLED\"").expect("status");
        assert_eq!(s, OrderStatus::PartiallyFilled);
        let s: OrderStatus = serde_json::from_str("\"CANCELED\"").expect("status");
        assert_eq!(s, OrderStatus::Cancelled);
        let s: OrderStatus = serde_json::from_str("\"weird\"").expect("status");
        assert_eq!(s, OrderStatus::Unknown);
    }

    #[test]
    fn test_order_deserialize() {
        let json = r#"{"orderId":123,"symbol":"BTCUSDT","side":"BUY","type":"LIMIT","price":"100","origQty":"2","executedQty":"0.5","status":"NEW","time":1700000000000}"#;
        let order: Order = serde_json::from_str(json).expect("deserialize");
        assert_eq!(order.order_id, "123");
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.remaining_quantity().to_string(), "1.5");
        assert!(order.is_for_symbol("btcusdt"));
    }

    #[test]
    fn test_order_deserialize_without_created_at() {
        let json = r#"{"id":"a1","symbol":"ETHUSDT","side":"sell","type":"market","quantity":1,"status":"filled"}"#;
        let order: Order = serde_json::from_str(json).expect("deserialize");
        assert_eq!(order.created_at, 0);
        assert!(order.price.is_none());
    }

    #[test]
    fn test_place_order_validate() {
        let ok = PlaceOrderRequest::limit("BTCUSDT", Side::Buy, Price::from_int(100), Quantity::from_int(1));
        assert!(ok.validate().is_ok());

        let no_price = PlaceOrderRequest {
            price: None,
            ..ok.clone()
        };
        assert!(matches!(no_price.validate(), Err(SdkError::InvalidPrice(_))));

        let zero_qty = PlaceOrderRequest::market("BTCUSDT", Side::Sell, Quantity::zero());
        assert!(matches!(zero_qty.validate(), Err(SdkError::InvalidQuantity(_))));

        let empty = PlaceOrderRequest::market(" ", Side::Sell, Quantity::from_int(1));
        assert!(matches!(empty.validate(), Err(SdkError::InvalidSymbol(_))));
    }

    #[test]
    fn test_place_order_serialize() {
        let req = PlaceOrderRequest::market("BTCUSDT", Side::Sell, Quantity::from_int(1))
            .with_market_type(MarketType::Futures)
            .with_client_order_id("c-1");
        let json = serde_json::to_string(&req).expect("serialize");
        assert!(json.contains("\"type\":\"market\""));
        assert!(json.contains("\"marketType\":\"futures\""));
        assert!(json.contains("\"clientOrderId\":\"c-1\""));
        assert!(!json.contains("\"price\""));
    }
}
