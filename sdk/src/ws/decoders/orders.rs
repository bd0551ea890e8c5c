//! User orders decoder.

use crate::types::Order;
use crate::ws::decoder::{payload_as, ChannelDecoder, ChannelSnapshot};
use crate::ws::error::DecodeError;
use crate::ws::messages::{ChannelKind, Params, ServerFrame};

/// Decodes `orders` frames.
///
/// The server pushes the user's full order set; the subscription's
/// `symbol` and `status` parameters narrow it client-side. `status=open`
/// keeps working orders, any other value matches the status name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdersDecoder;

impl ChannelDecoder for OrdersDecoder {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Orders
    }

    fn decode(
        &self,
        frame: &ServerFrame,
        params: &Params,
    ) -> Result<ChannelSnapshot, DecodeError> {
        let mut orders: Vec<Order> = payload_as(frame, self.kind())?;

        if let Some(symbol) = params.get("symbol") {
            orders.retain(|o| o.is_for_symbol(symbol));
        }
        if let Some(status) = params.get("status") {
            if status.eq_ignore_ascii_case("open") {
                orders.retain(|o| o.status.is_open());
            } else {
                orders.retain(|o| o.status.to_string().eq_ignore_ascii_case(status));
            }
        }

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ChannelSnapshot::Orders(orders))
    }
}
