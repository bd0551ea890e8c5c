//! SDK error types.
//!
//! Errors raised while parsing or validating core domain values.

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Price that is not a decimal or not positive where required.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity that is not a decimal or not positive where required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Empty or malformed trading symbol.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Market type other than spot or futures.
    #[error("invalid market type: {0}")]
    InvalidMarketType(String),

    /// Decimal arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,
}
