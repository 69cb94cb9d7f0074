//! Order tracking over an asynchronous venue connection.
//!
//! - **Command facade**: `OrderManager` validates, encodes and sends commands,
//!   registering each correlation id in the request ledger
//! - **Reconciliation**: `ReconciliationEngine` applies responses and
//!   subscription notifications to the Order Store
//! - **Events**: order updates, query results, market data and diagnostics
//!   are published on an unbounded channel
//!
//! Commands never wait for the venue. Callers that need "place and wait for
//! the ack" watch the event channel or poll `get_order`.

mod engine;
mod error;
mod events;
mod manager;
#[cfg(test)]
mod test_support;

pub use engine::{ReconciliationEngine, SharedSubscriptions};
pub use error::{OrderError, ValidationError};
pub use events::{create_event_channel, Diagnostic, EventReceiver, EventSender, SessionEvent};
pub use manager::{ModifyRequest, OrderManager, DEFAULT_HISTORY_COUNT};
