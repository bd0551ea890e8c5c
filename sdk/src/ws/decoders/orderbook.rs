//! Order book decoder.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{OrderBookSnapshot, RawLevel};
use crate::ws::decoder::{usize_param, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `orderbook` frames.
///
/// The payload is either `data: {bids, asks}` or `bids`/`asks` at the top
/// level of the frame. The optional `depth` parameter truncates each side.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderBookDecoder;

#[derive(Deserialize)]
struct BookPayload {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

impl OrderBookDecoder {
    fn payload(frame: &ServerFrame) -> Result<BookPayload, DecodeError> {
        let kind = ChannelKind::OrderBook;
        if let Some(data) = frame.data.as_ref().filter(|d| !d.is_null()) {
            if !data.is_object() {
                return Err(DecodeError::invalid(kind, "data is not an object"));
            }
            return serde_json::from_value(data.clone()).map_err(|e| DecodeError::invalid(kind, e));
        }

        let bids = frame.fields.get("bids");
        let asks = frame.fields.get("asks");
        if bids.is_none() && asks.is_none() {
            return Err(DecodeError::MissingPayload {
                channel: kind.to_string(),
            });
        }

        let side = |value: Option<&Value>| -> Result<Vec<RawLevel>, DecodeError> {
            match value {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(v) => {
                    serde_json::from_value(v.clone()).map_err(|e| DecodeError::invalid(kind, e))
                }
            }
        };

        Ok(BookPayload {
            bids: side(bids)?,
            asks: side(asks)?,
        })
    }
}

impl ChannelDecoder for OrderBookDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::OrderBook
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let payload = Self::payload(frame)?;
        let depth = usize_param(params, "depth");
        Ok(ChannelSnapshot::OrderBook(OrderBookSnapshot::from_levels(
            &payload.bids,
            &payload.asks,
            depth,
        )))
    }
}
