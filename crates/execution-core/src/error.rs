//! Error types for the order model and store.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::OrderStatus;

/// Order Store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An order with this id already exists; the existing entry is untouched.
    #[error("duplicate order id: {0}")]
    DuplicateOrder(String),
}

/// A status change outside the order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal order transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Reasons a trade could not be applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillError {
    /// The order is already `Cancelled` or `Rejected`.
    #[error("order is terminal ({0:?}), fill ignored")]
    Terminal(OrderStatus),

    /// The fill would take the filled amount beyond the requested amount.
    #[error("fill of {trade_amount} exceeds remaining {remaining}")]
    Overfill {
        trade_amount: Decimal,
        remaining: Decimal,
    },

    /// Zero or negative executed amount.
    #[error("non-positive fill amount {0}")]
    NonPositiveAmount(Decimal),
}

/// Reasons an amendment could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmendError {
    #[error("order is terminal ({0:?}), amendment ignored")]
    Terminal(OrderStatus),

    #[error("amended amount {amount} is below filled amount {filled}")]
    BelowFilled { amount: Decimal, filled: Decimal },
}
