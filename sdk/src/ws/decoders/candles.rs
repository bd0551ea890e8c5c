//! Candles decoder.

use crate::types::Candle;
use crate::ws::decoder::{payload_as, usize_param, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `candles` frames into an oldest-first list with one candle per
/// open time; a later entry for the same open time replaces an earlier one.
/// The optional `limit` parameter keeps the most recent candles.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandlesDecoder;

impl ChannelDecoder for CandlesDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Candles
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let mut raw: Vec<Candle> = payload_as(frame, self.kind())?;
        raw.sort_by_key(|c| c.open_time);

        let mut candles: Vec<Candle> = Vec::with_capacity(raw.len());
        for candle in raw {
            match candles.last_mut() {
                Some(last) if last.open_time == candle.open_time => *last = candle,
                _ => candles.push(candle),
            }
        }

        if let Some(limit) = usize_param(params, "limit") {
            let excess = candles.len().saturating_sub(limit);
            candles.drain(..excess);
        }
        Ok(ChannelSnapshot::Candles(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Price;

    fn decode(text: &str, params: &Params) -> Result<Vec<Candle>, DecodeError> {
        let frame = ServerFrame::parse(text)?;
        match CandlesDecoder.decode(&frame, params)? {
            ChannelSnapshot::Candles(candles) => Ok(candles),
            other => panic!("unexpected snapshot {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_sorted_and_deduplicated() {
        let candles = decode(
            r#"{"action":"update","channel":"candles","symbol":"BTCUSDT","interval":"1m","data":[
                [120000,"3","3","3","3","1"],
                [60000,"1","1","1","1","1"],
                [120000,"3","4","3","4","2"],
                [0,"0","0","0","0","1"]]}"#,
            &Params::new(),
        )
        .expect("decode");
        let times: Vec<_> = candles.iter().map(|c| c.open_time).collect();
        assert_eq!(times, [0, 60000, 120000]);
        assert_eq!(candles[2].close, Price::from_int(4));
    }

    #[test]
    fn test_decode_limit_keeps_latest() {
        let candles = decode(
            r#"{"action":"update","candles":[
                {"t":1,"o":1,"h":1,"l":1,"c":1},
                {"t":2,"o":1,"h":1,"l":1,"c":1},
                {"t":3,"o":1,"h":1,"l":1,"c":1}]}"#,
            &Params::new().with("limit", "2"),
        )
        .expect("decode");
        let times: Vec<_> = candles.iter().map(|c| c.open_time).collect();
        assert_eq!(times, [2, 3]);
    }

    #[test]
    fn test_decode_malformed_candle() {
        let err = decode(r#"{"action":"update","channel":"candles","data":[[1,"2"]]}"#, &Params::new())
            .expect_err("short kline");
        assert!(matches!(err, DecodeError::InvalidPayload { .. }));
    }
}
