//! Trades decoder.

use crate::types::Trade;
use crate::ws::decoder::{payload_as, usize_param, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `trades` frames into a newest-first list.
///
/// The payload must be an array. The optional `limit` parameter keeps the
/// most recent trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradesDecoder;

impl ChannelDecoder for TradesDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Trades
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let mut trades: Vec<Trade> = payload_as(frame, self.kind())?;
        trades.sort_by(|a, b| b.time.cmp(&a.time));
        if let Some(limit) = usize_param(params, "limit") {
            trades.truncate(limit);
        }
        Ok(ChannelSnapshot::Trades(trades))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str, params: &Params) -> Result<Vec<Trade>, DecodeError> {
        let frame = ServerFrame::parse(text)?;
        match TradesDecoder.decode(&frame, params)? {
            ChannelSnapshot::Trades(trades) => Ok(trades),
            other => panic!("unexpected snapshot {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_newest_first() {
        let trades = decode(
            r#"{"action":"trade_update","channel":"trades","symbol":"BTCUSDT","data":[
                {"id":1,"price":"100","quantity":"1","time":1000},
                {"id":3,"price":"102","quantity":"1","time":3000},
                {"id":2,"price":"101","quantity":"1","time":2000}]}"#,
            &Params::new(),
        )
        .expect("decode");
        let ids: Vec<_> = trades.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["3", "2", "1"]);
    }

    #[test]
    fn test_decode_bespoke_field_and_limit() {
        let trades = decode(
            r#"{"action":"update","trades":[
                {"id":"a","price":1,"qty":1,"T":1},
                {"id":"b","price":1,"qty":1,"T":2}]}"#,
            &Params::new().with("limit", "1"),
        )
        .expect("decode");
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, "b");
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let err = decode(
            r#"{"action":"update","channel":"trades","data":{"id":1}}"#,
            &Params::new(),
        )
        .expect_err("object payload");
        assert!(matches!(err, DecodeError::InvalidPayload { .. }));
    }
}
