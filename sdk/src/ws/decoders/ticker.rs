//! Ticker decoder.

use serde::Deserialize;

use crate::types::Ticker;
use crate::ws::decoder::{payload_as, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `ticker` frames.
///
/// Accepts a list of tickers or a single ticker. An optional `symbol`
/// parameter filters the list.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickerDecoder;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Ticker>),
    One(Ticker),
}

impl ChannelDecoder for TickerDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Ticker
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let mut tickers = match payload_as::<OneOrMany>(frame, self.kind())? {
            OneOrMany::Many(list) => list,
            OneOrMany::One(ticker) => vec![ticker],
        };
        if let Some(symbol) = params.get("symbol") {
            tickers.retain(|t| t.symbol.eq_ignore_ascii_case(symbol));
        }
        Ok(ChannelSnapshot::Ticker(tickers))
    }
}
