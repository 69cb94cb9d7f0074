//! Shared test doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use connector_core::{ConnectionState, ConnectionStatus, FrameSink, TransportError};
use execution_core::{InstrumentKind, OrderDraft, OrderKind, OrderSide};
use metrics::create_metrics;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::events::{Diagnostic, EventReceiver, SessionEvent};
use crate::manager::OrderManager;

/// In-memory gateway that records every frame.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    frames: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}

pub(crate) struct Harness {
    pub manager: OrderManager<RecordingSink>,
    pub sink: RecordingSink,
    pub events: EventReceiver,
}

pub(crate) fn harness() -> Harness {
    let sink = RecordingSink::default();
    let status = ConnectionStatus::new();
    status.set(ConnectionState::Connected);
    let (manager, events) = OrderManager::new(sink.clone(), status, create_metrics());
    Harness {
        manager,
        sink,
        events,
    }
}

impl Harness {
    pub fn last_sent(&self) -> Value {
        self.sink.frames().pop().unwrap()
    }

    pub fn respond(&self, correlation_id: u64, result: Value) {
        let frame = json!({ "jsonrpc": "2.0", "id": correlation_id, "result": result });
        self.manager.handle_frame(&frame.to_string());
    }

    pub fn respond_error(&self, correlation_id: u64, code: i64, message: &str) {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": correlation_id,
            "error": { "code": code, "message": message }
        });
        self.manager.handle_frame(&frame.to_string());
    }

    pub fn notify(&self, channel: &str, data: Value) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": { "channel": channel, "data": data }
        });
        self.manager.handle_frame(&frame.to_string());
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn diagnostics(&mut self) -> Vec<Diagnostic> {
        self.drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Diagnostic(d) => Some(d),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn market(order_id: &str, side: OrderSide, amount: Decimal) -> OrderDraft {
    OrderDraft::new(
        order_id,
        "BTC-PERPETUAL",
        InstrumentKind::Futures,
        side,
        OrderKind::Market,
        amount,
    )
}

/// Venue order object.
pub(crate) fn order_json(venue_id: &str, label: &str, state: &str, amount: Decimal) -> Value {
    json!({
        "order_id": venue_id,
        "order_state": state,
        "direction": "buy",
        "instrument_name": "BTC-PERPETUAL",
        "price": "market_price",
        "amount": amount.to_string(),
        "filled_amount": 0,
        "average_price": 0,
        "label": label,
        "order_type": "market"
    })
}

/// Venue trade object.
pub(crate) fn trade_json(
    trade_id: &str,
    venue_order_id: &str,
    amount: Decimal,
    price: Decimal,
    timestamp: i64,
) -> Value {
    json!({
        "trade_id": trade_id,
        "order_id": venue_order_id,
        "instrument_name": "BTC-PERPETUAL",
        "price": price.to_string(),
        "amount": amount.to_string(),
        "fee": "0",
        "fee_currency": "BTC",
        "direction": "buy",
        "timestamp": timestamp
    })
}
