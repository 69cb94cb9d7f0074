//! Core order tracking types.
//!
//! - **Order model**: `Order`, `OrderDraft`, `Trade`, `OrderStatus` and its state machine
//! - **Order Store**: `OrderStore`, the single source of truth for local orders
//! - **Request ledger**: `RequestLedger` correlating outbound commands with responses
//! - **Positions**: `PositionAggregator`, a projection of the store's trade history
//!
//! # Order Lifecycle
//!
//! 1. Caller submits an `OrderDraft`
//! 2. The order is inserted as `PendingNew` and the place command registered in the ledger
//! 3. The venue answers the correlated request: `Open` or `Rejected`
//! 4. Trades arrive in responses or subscription events and are appended once each
//! 5. The order reaches `Filled`, `Cancelled` or `Rejected` and stays in the store

mod correlation;
mod draft;
mod error;
mod order;
mod position;
mod store;
mod trade;

pub use correlation::{
    create_request_ledger, CommandKind, CorrelationInUse, LedgerEntry, RequestLedger,
    SharedRequestLedger,
};
pub use draft::DraftParseError;
pub use error::{AmendError, FillError, StoreError, TransitionError};
pub use order::{
    weighted_average_price, FillOutcome, InstrumentKind, Order, OrderDraft, OrderKind, OrderSide,
    OrderStatus, TriggerReference,
};
pub use position::{Position, PositionAggregator};
pub use store::{create_order_store, OrderStore, SharedOrderStore};
pub use trade::Trade;
