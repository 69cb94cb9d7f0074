//! Errors returned synchronously by the command facade.

use auth::AuthError;
use connector_core::TransportError;
use execution_core::{OrderKind, OrderStatus};
use protocol::CodecError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Argument problems caught before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("order id must not be empty")]
    EmptyOrderId,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("{0} orders require a price")]
    MissingPrice(OrderKind),

    #[error("{0} orders require a trigger price")]
    MissingTriggerPrice(OrderKind),

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("order {order_id} is already {status}")]
    OrderTerminal {
        order_id: String,
        status: OrderStatus,
    },

    #[error("modify needs a new price or a new amount")]
    NothingToModify,

    #[error("new amount {amount} is below filled amount {filled}")]
    AmountBelowFilled { amount: Decimal, filled: Decimal },
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("duplicate order id: {0}")]
    DuplicateOrder(String),

    /// The gateway refused the frame. Nothing was sent; no retry is attempted.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),

    #[error("correlation id {0} is already in flight")]
    CorrelationCollision(u64),

    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error("cannot build auth request: {0}")]
    Auth(#[from] AuthError),
}

impl OrderError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}
