//! Executed trade records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderSide;

/// A single execution against an order. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Venue trade id, unique within the parent order.
    pub trade_id: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub fee_currency: Option<String>,
    pub direction: OrderSide,
    /// Venue execution time in milliseconds.
    pub timestamp_ms: i64,
}

impl Trade {
    pub fn new(
        trade_id: impl Into<String>,
        price: Decimal,
        amount: Decimal,
        direction: OrderSide,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            price,
            amount,
            fee: Decimal::ZERO,
            fee_currency: None,
            direction,
            timestamp_ms,
        }
    }

    pub fn with_fee(mut self, fee: Decimal, currency: impl Into<String>) -> Self {
        self.fee = fee;
        self.fee_currency = Some(currency.into());
        self
    }

    /// Executed amount signed by direction.
    pub fn signed_amount(&self) -> Decimal {
        self.amount * self.direction.sign()
    }

    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_amount() {
        let buy = Trade::new("T1", dec!(100), dec!(2), OrderSide::Buy, 1);
        let sell = Trade::new("T2", dec!(100), dec!(2), OrderSide::Sell, 1);
        assert_eq!(buy.signed_amount(), dec!(2));
        assert_eq!(sell.signed_amount(), dec!(-2));
        assert_eq!(sell.notional(), dec!(200));
    }

    #[test]
    fn test_with_fee() {
        let t = Trade::new("T1", dec!(100), dec!(2), OrderSide::Buy, 1).with_fee(dec!(0.01), "BTC");
        assert_eq!(t.fee, dec!(0.01));
        assert_eq!(t.fee_currency.as_deref(), Some("BTC"));
    }
}
