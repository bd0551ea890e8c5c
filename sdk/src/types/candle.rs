//! Candle (OHLCV) types for the Tickstream SDK.

use serde::{Deserialize, Serialize};

use super::millis;
use super::primitives::{Price, Quantity};

/// One OHLCV candle.
///
/// Accepts objects (`{"openTime":..,"open":..}`) or kline arrays
/// (`[openTime, open, high, low, close, volume, closeTime?, ..]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "CandleRepr")]
pub struct Candle {
    /// Open time in milliseconds since epoch.
    pub open_time: i64,

    /// Open price.
    pub open: Price,

    /// High price.
    pub high: Price,

    /// Low price.
    pub low: Price,

    /// Close price.
    pub close: Price,

    /// Base volume.
    pub volume: Quantity,

    /// Close time in milliseconds since epoch, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<i64>,
}

impl Candle {
    /// Returns true if the candle closed at or above its open.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleObject {
    #[serde(deserialize_with = "millis", alias = "time", alias = "t", alias = "timestamp")]
    open_time: i64,
    #[serde(alias = "o")]
    open: Price,
    #[serde(alias = "h")]
    high: Price,
    #[serde(alias = "l")]
    low: Price,
    #[serde(alias = "c")]
    close: Price,
    #[serde(default, alias = "v")]
    volume: Quantity,
    #[serde(default, alias = "T")]
    close_time: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CandleRepr {
    Object(CandleObject),
    Array(Vec<serde_json::Value>),
}

impl TryFrom<CandleRepr> for Candle {
    type Error = String;

    fn try_from(repr: CandleRepr) -> Result<Self, Self::Error> {
        match repr {
            CandleRepr::Object(o) => Ok(Self {
                open_time: o.open_time,
                open: o.open,
                high: o.high,
                low: o.low,
                close: o.close,
                volume: o.volume,
                close_time: o.close_time,
            }),
            CandleRepr::Array(values) => {
                if values.len() < 5 {
                    return Err(format!("kline array too short: {} fields", values.len()));
                }
                Ok(Self {
                    open_time: array_millis(&values, 0)?
                        .ok_or_else(|| "kline array missing open time".to_string())?,
                    open: array_field(&values, 1)?,
                    high: array_field(&values, 2)?,
                    low: array_field(&values, 3)?,
                    close: array_field(&values, 4)?,
                    volume: if values.len() > 5 {
                        array_field(&values, 5)?
                    } else {
                        Quantity::zero()
                    },
                    close_time: array_millis(&values, 6)?,
                })
            }
        }
    }
}

fn array_field<T: serde::de::DeserializeOwned>(
    values: &[serde_json::Value],
    index: usize,
) -> Result<T, String> {
    let value = values
        .get(index)
        .cloned()
        .ok_or_else(|| format!("kline field {} missing", index))?;
    serde_json::from_value(value).map_err(|e| format!("kline field {}: {}", index, e))
}

fn array_millis(values: &[serde_json::Value], index: usize) -> Result<Option<i64>, String> {
    match values.get(index) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("kline field {} is not an integer", index)),
        Some(serde_json::Value::String(s)) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|e| format!("kline field {}: {}", index, e)),
        Some(other) => Err(format!("kline field {} has unexpected type: {}", index, other)),
    }
}
