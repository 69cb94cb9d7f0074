//! Session events and non-fatal diagnostics.

use execution_core::{CommandKind, Order, OrderStatus};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Anomalies met while reconciling inbound traffic.
///
/// None of these stop the inbound pipeline; each is logged and published.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Diagnostic {
    #[error("malformed frame dropped: {reason}")]
    MalformedFrame { reason: String },

    #[error("payload for request {correlation_id:?} has an unexpected shape: {reason}")]
    InvalidPayload {
        correlation_id: Option<u64>,
        reason: String,
    },

    #[error("response with no matching request (id {correlation_id:?})")]
    OrphanResponse { correlation_id: Option<u64> },

    #[error("event on {channel} references unknown venue order {venue_order_id}")]
    OrphanEvent {
        channel: String,
        venue_order_id: String,
    },

    #[error("{kind} result references unknown order {order_id}")]
    UnknownOrder { kind: CommandKind, order_id: String },

    #[error("{kind} request {correlation_id} timed out")]
    RequestTimedOut {
        correlation_id: u64,
        kind: CommandKind,
        order_id: Option<String>,
    },

    #[error("venue error {code} ({message}) for request {correlation_id:?}")]
    ProtocolError {
        correlation_id: Option<u64>,
        kind: Option<CommandKind>,
        order_id: Option<String>,
        code: i64,
        message: String,
    },

    #[error("order {order_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {order_id}: fill {trade_id} ignored, order is {status}")]
    LateFill {
        order_id: String,
        trade_id: String,
        status: OrderStatus,
    },

    #[error("order {order_id}: fill {trade_id} of {trade_amount} exceeds remaining {remaining}")]
    Overfill {
        order_id: String,
        trade_id: String,
        trade_amount: Decimal,
        remaining: Decimal,
    },

    #[error("order {order_id}: venue amendment ignored: {reason}")]
    AmendmentIgnored { order_id: String, reason: String },

    #[error("authentication failed: {code} {message}")]
    AuthenticationFailed { code: i64, message: String },
}

/// Everything the session publishes to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An order changed; carries the new state.
    OrderUpdated(Box<Order>),
    /// Result of a read-only query, forwarded untouched.
    QueryResult { kind: CommandKind, payload: Value },
    /// Notification on a non-order channel.
    MarketData { channel: String, payload: Value },
    /// Confirmed subscription set changed.
    SubscriptionsChanged(Vec<String>),
    Authenticated { scope: String, expires_in_secs: i64 },
    Diagnostic(Diagnostic),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
