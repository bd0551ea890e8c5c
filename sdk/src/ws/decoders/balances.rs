//! User balances decoder.

use crate::types::balance::BalancePayload;
use crate::ws::decoder::{payload_as, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `balances` frames into an asset-keyed map.
///
/// An optional comma-separated `assets` parameter restricts the map.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancesDecoder;

impl ChannelDecoder for BalancesDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Balances
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let mut balances = payload_as::<BalancePayload>(frame, self.kind())?.into_map();

        if let Some(assets) = params.get("assets") {
            let wanted: Vec<String> = assets
                .split(',')
                .map(|a| a.trim().to_ascii_uppercase())
                .filter(|a| !a.is_empty())
                .collect();
            balances.retain(|asset, _| wanted.iter().any(|w| w == asset));
        }
        Ok(ChannelSnapshot::Balances(balances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BalanceMap, Quantity};

    fn decode(text: &str, params: &Params) -> Result<BalanceMap, DecodeError> {
        let frame = ServerFrame::parse(text)?;
        match BalancesDecoder.decode(&frame, params)? {
            ChannelSnapshot::Balances(map) => Ok(map),
            other => panic!("unexpected snapshot {:?}", other.kind()),
        }
    }

    #[test]
    fn test_decode_map_payload() {
        let map = decode(
            r#"{"action":"update","channel":"balances","data":{"BTC":{"free":"1","locked":"0.5"},"usdt":{"free":"100","locked":"0"}}}"#,
            &Params::new(),
        )
        .expect("decode");
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get("BTC").map(|b| b.total()),
            Some(Quantity::new(rust_decimal::Decimal::new(15, 1)))
        );
    }

    #[test]
    fn test_decode_list_payload_with_filter() {
        let map = decode(
            r#"{"action":"update","balances":[{"asset":"BTC","free":1},{"asset":"ETH","free":2},{"asset":"USDT","free":3}]}"#,
            &Params::new().with("assets", "eth, usdt"),
        )
        .expect("decode");
        let assets: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(assets, ["ETH", "USDT"]);
    }

    #[test]
    fn test_decode_invalid_payload() {
        let err = decode(r#"{"action":"update","channel":"balances","data":42}"#, &Params::new())
            .expect_err("number payload");
        assert!(matches!(err, DecodeError::InvalidPayload { .. }));
    }
}
