//! Typed views of inbound result and event payloads.
//!
//! Raw structs mirror the venue's JSON field names; conversion into
//! execution-core types happens here so the engine never touches raw JSON
//! for order data.

use std::str::FromStr;

use execution_core::{OrderSide, OrderStatus, Trade};
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CodecError;

/// Decimal that may arrive as a number, a numeric string, or a marker string
/// such as `"market_price"` (mapped to `None`).
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) => Decimal::from_str(&s).ok(),
        _ => None,
    })
}

/// Order object as returned by buy/sell/edit/cancel and `user.orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    /// Venue order id
    pub order_id: String,
    #[serde(default)]
    pub order_state: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub instrument_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub filled_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub last_update_timestamp: Option<i64>,
}

impl OrderPayload {
    /// Mapped `order_state`, if present and known.
    pub fn status(&self) -> Option<OrderStatus> {
        self.order_state
            .as_deref()
            .and_then(OrderStatus::from_venue_state)
    }

    /// Non-empty label, the client order id when the draft had none.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.is_empty())
    }
}

/// Trade object from results and `user.trades`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    pub trade_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub instrument_name: Option<String>,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub fee_currency: Option<String>,
    pub direction: String,
    pub timestamp: i64,
    #[serde(default)]
    pub label: Option<String>,
}

impl TradePayload {
    pub fn to_trade(&self) -> Result<Trade, CodecError> {
        let direction = OrderSide::from_venue_str(&self.direction).ok_or_else(|| {
            CodecError::InvalidPayload(format!("unknown trade direction: {}", self.direction))
        })?;
        Ok(Trade {
            trade_id: self.trade_id.clone(),
            price: self.price,
            amount: self.amount,
            fee: self.fee,
            fee_currency: self.fee_currency.clone(),
            direction,
            timestamp_ms: self.timestamp,
        })
    }
}

/// Result of `private/buy`, `private/sell` and `private/edit`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResultPayload {
    pub order: OrderPayload,
    #[serde(default)]
    pub trades: Vec<TradePayload>,
}

/// Data of a `user.changes.*` notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangesPayload {
    #[serde(default)]
    pub orders: Vec<OrderPayload>,
    #[serde(default)]
    pub trades: Vec<TradePayload>,
}

/// `user.orders.*.raw` sends one order, the aggregated variants send a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// Deserialize a payload into `T`.
pub fn from_payload<T: DeserializeOwned>(payload: &Value) -> Result<T, CodecError> {
    T::deserialize(payload).map_err(|e| CodecError::InvalidPayload(e.to_string()))
}

/// Channel names confirmed by a subscribe/unsubscribe result.
pub fn parse_channel_list(payload: &Value) -> Result<Vec<String>, CodecError> {
    from_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_order_result() {
        let payload = json!({
            "order": {
                "order_id": "ETH-584849853",
                "order_state": "filled",
                "direction": "buy",
                "instrument_name": "ETH-PERPETUAL",
                "price": "market_price",
                "amount": 40,
                "filled_amount": 40,
                "average_price": 1860.55,
                "label": "O1",
                "order_type": "market"
            },
            "trades": [{
                "trade_id": "ETH-8484",
                "order_id": "ETH-584849853",
                "price": 1860.55,
                "amount": 40,
                "fee": 0.000012,
                "fee_currency": "ETH",
                "direction": "buy",
                "timestamp": 1590484156350i64
            }]
        });

        let result: OrderResultPayload = from_payload(&payload).unwrap();
        assert_eq!(result.order.price, None);
        assert_eq!(result.order.amount, Some(dec!(40)));
        assert_eq!(result.order.average_price, Some(dec!(1860.55)));
        assert_eq!(result.order.status(), Some(OrderStatus::Filled));
        assert_eq!(result.order.label(), Some("O1"));

        let trade = result.trades[0].to_trade().unwrap();
        assert_eq!(trade.trade_id, "ETH-8484");
        assert_eq!(trade.amount, dec!(40));
        assert_eq!(trade.fee, dec!(0.000012));
        assert_eq!(trade.direction, OrderSide::Buy);
    }

    #[test]
    fn test_trade_bad_direction() {
        let payload = json!({
            "trade_id": "T1", "price": 1, "amount": 1, "direction": "up", "timestamp": 1
        });
        let trade: TradePayload = from_payload(&payload).unwrap();
        assert!(matches!(trade.to_trade(), Err(CodecError::InvalidPayload(_))));
    }

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<OrderPayload> = from_payload(&json!({ "order_id": "A" })).unwrap();
        let many: OneOrMany<OrderPayload> =
            from_payload(&json!([{ "order_id": "A" }, { "order_id": "B" }])).unwrap();
        assert_eq!(one.into_vec().len(), 1);
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn test_missing_order_id_is_invalid() {
        let err = from_payload::<OrderResultPayload>(&json!({ "order": {} })).unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload(_)));
    }

    #[test]
    fn test_channel_list() {
        let channels = parse_channel_list(&json!(["ticker.BTC-PERPETUAL.raw"])).unwrap();
        assert_eq!(channels, vec!["ticker.BTC-PERPETUAL.raw"]);
    }
}
