//! In-flight request ledger.
//!
//! Every outbound command is registered here under its correlation id before
//! the frame is handed to the transport. The matching response removes the
//! entry; entries nobody answered are reaped after a timeout.
//!
//! 1. Encode the command (the codec assigns the correlation id)
//! 2. `register` the id with the command kind and target order
//! 3. Send the frame
//! 4. Either:
//!    a. the response arrives -> `take` returns the entry
//!    b. nothing arrives -> `reap_expired` returns it as timed out

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// What kind of command a correlation id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Authenticate,
    Place,
    Cancel,
    Modify,
    Subscribe,
    Unsubscribe,
    UnsubscribeAll,
    OrderHistoryByCurrency,
    OrderHistoryByInstrument,
    BookSummaryByInstrument,
    BookSummaryByCurrency,
    Ticker,
    ContractSize,
    Currencies,
    SetHeartbeat,
    Test,
}

impl CommandKind {
    /// Whether the response is reconciled into the Order Store.
    pub fn targets_order(&self) -> bool {
        matches!(self, Self::Place | Self::Cancel | Self::Modify)
    }

    /// Read-only queries whose results are forwarded untouched.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::OrderHistoryByCurrency
                | Self::OrderHistoryByInstrument
                | Self::BookSummaryByInstrument
                | Self::BookSummaryByCurrency
                | Self::Ticker
                | Self::ContractSize
                | Self::Currencies
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub correlation_id: u64,
    pub kind: CommandKind,
    /// Local order id for place/cancel/modify.
    pub order_id: Option<String>,
    pub issued_at_ms: i64,
}

impl LedgerEntry {
    pub fn new(correlation_id: u64, kind: CommandKind, issued_at_ms: i64) -> Self {
        Self {
            correlation_id,
            kind,
            order_id: None,
            issued_at_ms,
        }
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

/// Returned when a correlation id is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationInUse(pub u64);

/// Thread-safe correlation id -> request map.
pub struct RequestLedger {
    pending: DashMap<u64, LedgerEntry>,
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLedger {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Register an outbound request. An id that is already in flight is
    /// refused and the existing entry kept.
    pub fn register(&self, entry: LedgerEntry) -> Result<(), CorrelationInUse> {
        match self.pending.entry(entry.correlation_id) {
            Entry::Occupied(_) => Err(CorrelationInUse(entry.correlation_id)),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Remove and return the entry for a response.
    pub fn take(&self, correlation_id: u64) -> Option<LedgerEntry> {
        self.pending.remove(&correlation_id).map(|(_, entry)| entry)
    }

    /// Drop an entry without a response (e.g. the send failed).
    pub fn remove(&self, correlation_id: u64) {
        self.pending.remove(&correlation_id);
    }

    pub fn contains(&self, correlation_id: u64) -> bool {
        self.pending.contains_key(&correlation_id)
    }

    /// Remove and return every entry older than `timeout_ms`.
    pub fn reap_expired(&self, timeout_ms: i64, current_time_ms: i64) -> Vec<LedgerEntry> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|e| current_time_ms - e.issued_at_ms >= timeout_ms)
            .map(|e| *e.key())
            .collect();

        let mut reaped: Vec<LedgerEntry> = expired
            .into_iter()
            .filter_map(|id| self.take(id))
            .collect();
        reaped.sort_by_key(|e| e.correlation_id);
        reaped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Shared handle to the request ledger.
pub type SharedRequestLedger = Arc<RequestLedger>;

/// Create a new shared request ledger.
pub fn create_request_ledger() -> SharedRequestLedger {
    Arc::new(RequestLedger::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_take() {
        let ledger = RequestLedger::new();
        ledger
            .register(LedgerEntry::new(1, CommandKind::Place, 1000).with_order("O1"))
            .unwrap();
        assert_eq!(ledger.len(), 1);

        let entry = ledger.take(1).unwrap();
        assert_eq!(entry.kind, CommandKind::Place);
        assert_eq!(entry.order_id.as_deref(), Some("O1"));
        assert!(ledger.take(1).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_collision_keeps_existing() {
        let ledger = RequestLedger::new();
        ledger
            .register(LedgerEntry::new(7, CommandKind::Cancel, 1000).with_order("O1"))
            .unwrap();

        let err = ledger
            .register(LedgerEntry::new(7, CommandKind::Place, 2000).with_order("O2"))
            .unwrap_err();

        assert_eq!(err, CorrelationInUse(7));
        assert_eq!(ledger.take(7).unwrap().order_id.as_deref(), Some("O1"));
    }

    #[test]
    fn test_reap_expired() {
        let ledger = RequestLedger::new();
        ledger.register(LedgerEntry::new(2, CommandKind::Ticker, 1000)).unwrap();
        ledger.register(LedgerEntry::new(1, CommandKind::Place, 1500)).unwrap();
        ledger.register(LedgerEntry::new(3, CommandKind::Cancel, 5000)).unwrap();

        // 2000ms timeout at time 6000
        let reaped = ledger.reap_expired(2000, 6000);

        let ids: Vec<u64> = reaped.iter().map(|e| e.correlation_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(3));
    }

    #[test]
    fn test_command_kind_classes() {
        assert!(CommandKind::Modify.targets_order());
        assert!(!CommandKind::Subscribe.targets_order());
        assert!(CommandKind::Currencies.is_query());
        assert!(!CommandKind::Place.is_query());
    }
}
