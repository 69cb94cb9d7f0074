//! Parsing orders from the whitespace-delimited console form.
//!
//! `id instrument instrumentType side kind amount price [label]`, where a
//! price of `0` means no limit price.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::{InstrumentKind, OrderDraft, OrderKind, OrderSide};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftParseError {
    #[error("expected 7 or 8 fields, got {0}")]
    Arity(usize),

    #[error("invalid instrument type: {0}")]
    InvalidInstrumentKind(String),

    #[error("invalid side: {0}")]
    InvalidSide(String),

    #[error("invalid order kind: {0}")]
    InvalidOrderKind(String),

    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, DraftParseError> {
    Decimal::from_str(value).map_err(|_| DraftParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

impl FromStr for OrderDraft {
    type Err = DraftParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [id, instrument, instrument_kind, side, kind, amount, price, rest @ ..] =
            fields.as_slice()
        else {
            return Err(DraftParseError::Arity(fields.len()));
        };
        if rest.len() > 1 {
            return Err(DraftParseError::Arity(fields.len()));
        }

        let instrument_kind = instrument_kind
            .parse::<InstrumentKind>()
            .map_err(|_| DraftParseError::InvalidInstrumentKind(instrument_kind.to_string()))?;
        let side = side
            .parse::<OrderSide>()
            .map_err(|_| DraftParseError::InvalidSide(side.to_string()))?;
        let kind = kind
            .parse::<OrderKind>()
            .map_err(|_| DraftParseError::InvalidOrderKind(kind.to_string()))?;
        let amount = parse_decimal("amount", amount)?;
        let price = parse_decimal("price", price)?;

        let mut draft = OrderDraft::new(*id, *instrument, instrument_kind, side, kind, amount);
        if !price.is_zero() {
            draft = draft.with_price(price);
        }
        if let Some(label) = rest.first() {
            draft = draft.with_label(*label);
        }
        Ok(draft)
    }
}
