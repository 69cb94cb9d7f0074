//! Command facade: the public surface used by presentation layers.
//!
//! Every operation validates its arguments, encodes the command, registers
//! the correlation id in the ledger and hands the frame to the gateway.
//! Nothing here waits for the venue; replies are applied by the
//! [`ReconciliationEngine`] when they arrive.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use auth::Authenticator;
use connector_core::{ConnectionStatus, FrameSink};
use execution_core::{
    create_order_store, create_request_ledger, LedgerEntry, Order, OrderDraft, Position,
    PositionAggregator, SharedOrderStore, SharedRequestLedger, StoreError,
};
use metrics::SharedMetrics;
use parking_lot::RwLock;
use protocol::{AdvancedMode, Command, EditRequest, ProtocolCodec};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::engine::{now_ms, ReconciliationEngine, SharedSubscriptions};
use crate::error::{OrderError, ValidationError};
use crate::events::{create_event_channel, EventReceiver};

/// Number of orders returned by the history queries unless asked otherwise.
pub const DEFAULT_HISTORY_COUNT: u32 = 10;

/// Arguments of a modify (`private/edit`) request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyRequest {
    pub new_price: Option<Decimal>,
    pub new_amount: Option<Decimal>,
    pub advanced: Option<AdvancedMode>,
    pub post_only: bool,
    pub reduce_only: bool,
}

impl ModifyRequest {
    pub fn price(price: Decimal) -> Self {
        Self {
            new_price: Some(price),
            ..Default::default()
        }
    }

    pub fn amount(amount: Decimal) -> Self {
        Self {
            new_amount: Some(amount),
            ..Default::default()
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn validate_draft(draft: &OrderDraft) -> Result<(), ValidationError> {
    if draft.order_id.trim().is_empty() {
        return Err(ValidationError::EmptyOrderId);
    }
    require_non_empty("instrument", &draft.instrument)?;
    if draft.amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(draft.amount));
    }
    match draft.price {
        Some(price) if price <= Decimal::ZERO => {
            return Err(ValidationError::NonPositivePrice(price))
        }
        None if draft.kind.requires_price() => {
            return Err(ValidationError::MissingPrice(draft.kind))
        }
        _ => {}
    }
    if draft.kind.requires_trigger_price() && draft.trigger_price.is_none() {
        return Err(ValidationError::MissingTriggerPrice(draft.kind));
    }
    Ok(())
}

/// Order tracking session over one gateway.
pub struct OrderManager<S> {
    codec: ProtocolCodec,
    store: SharedOrderStore,
    ledger: SharedRequestLedger,
    positions: PositionAggregator,
    subscriptions: SharedSubscriptions,
    engine: ReconciliationEngine,
    sink: S,
    status: ConnectionStatus,
    metrics: SharedMetrics,
}

impl<S: FrameSink> OrderManager<S> {
    /// Create a session and the receiver for its events.
    pub fn new(sink: S, status: ConnectionStatus, metrics: SharedMetrics) -> (Self, EventReceiver) {
        Self::with_codec(sink, status, metrics, ProtocolCodec::new())
    }

    pub fn with_codec(
        sink: S,
        status: ConnectionStatus,
        metrics: SharedMetrics,
        codec: ProtocolCodec,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = create_event_channel();
        let store = create_order_store();
        let ledger = create_request_ledger();
        let subscriptions: SharedSubscriptions = Arc::new(RwLock::new(BTreeSet::new()));
        let engine = ReconciliationEngine::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&subscriptions),
            status.clone(),
            events,
            Arc::clone(&metrics),
        );

        let manager = Self {
            codec,
            positions: PositionAggregator::new(Arc::clone(&store)),
            store,
            ledger,
            subscriptions,
            engine,
            sink,
            status,
            metrics,
        };
        (manager, receiver)
    }

    // --- Orders ---

    /// Insert the order as `PendingNew` and send it.
    ///
    /// If the gateway refuses the frame the order is withdrawn again, since
    /// the venue never saw it.
    pub fn place(&self, draft: OrderDraft) -> Result<u64, OrderError> {
        validate_draft(&draft)?;

        let order_id = draft.order_id.clone();
        self.store
            .create(Order::from_draft(draft.clone(), now_ms()))
            .map_err(|StoreError::DuplicateOrder(id)| OrderError::DuplicateOrder(id))?;

        let result = self.dispatch(Command::Place(draft), Some(&order_id));
        if result.is_err() {
            self.store.withdraw_unsent(&order_id);
        }
        result
    }

    pub fn cancel(&self, order_id: &str) -> Result<u64, OrderError> {
        let order = self.active_order(order_id)?;
        let wire_id = order.venue_order_id.unwrap_or(order.order_id);
        self.dispatch(
            Command::Cancel { order_id: wire_id },
            Some(order_id),
        )
    }

    /// Send a price and/or amount change. The local order is only amended
    /// once the venue confirms.
    pub fn modify(&self, order_id: &str, request: ModifyRequest) -> Result<u64, OrderError> {
        let order = self.active_order(order_id)?;
        if request.new_price.is_none() && request.new_amount.is_none() {
            return Err(ValidationError::NothingToModify.into());
        }
        if let Some(price) = request.new_price.filter(|p| *p <= Decimal::ZERO) {
            return Err(ValidationError::NonPositivePrice(price).into());
        }
        if let Some(amount) = request.new_amount {
            if amount <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveAmount(amount).into());
            }
            if amount < order.filled_amount {
                return Err(ValidationError::AmountBelowFilled {
                    amount,
                    filled: order.filled_amount,
                }
                .into());
            }
        }

        let edit = EditRequest {
            order_id: order.venue_order_id.unwrap_or(order.order_id),
            // The venue requires an amount on every edit.
            amount: Some(request.new_amount.unwrap_or(order.amount)),
            price: request.new_price.or(order.price),
            advanced: request.advanced,
            post_only: request.post_only,
            reduce_only: request.reduce_only,
        };
        self.dispatch(Command::Edit(edit), Some(order_id))
    }

    fn active_order(&self, order_id: &str) -> Result<Order, ValidationError> {
        if order_id.trim().is_empty() {
            return Err(ValidationError::EmptyOrderId);
        }
        let order = self
            .store
            .get(order_id)
            .ok_or_else(|| ValidationError::UnknownOrder(order_id.to_string()))?;
        if order.is_terminal() {
            return Err(ValidationError::OrderTerminal {
                order_id: order.order_id,
                status: order.status,
            });
        }
        Ok(order)
    }

    // --- Subscriptions ---

    pub fn subscribe(&self, channel: &str) -> Result<u64, OrderError> {
        self.stream_market_data(&[channel.to_string()])
    }

    /// Subscribe to several channels in one request.
    pub fn stream_market_data(&self, channels: &[String]) -> Result<u64, OrderError> {
        let channels = Self::validate_channels(channels)?;
        self.dispatch(Command::Subscribe { channels }, None)
    }

    pub fn unsubscribe(&self, channel: &str) -> Result<u64, OrderError> {
        let channels = Self::validate_channels(&[channel.to_string()])?;
        self.dispatch(Command::Unsubscribe { channels }, None)
    }

    pub fn unsubscribe_all(&self) -> Result<u64, OrderError> {
        self.dispatch(Command::UnsubscribeAll, None)
    }

    /// Re-send every confirmed subscription plus `extra` (after a reconnect).
    pub fn resubscribe(&self, extra: &[String]) -> Result<Option<u64>, OrderError> {
        let mut channels: BTreeSet<String> = self.subscriptions.read().clone();
        channels.extend(extra.iter().filter(|c| !c.trim().is_empty()).cloned());
        if channels.is_empty() {
            return Ok(None);
        }
        let channels: Vec<String> = channels.into_iter().collect();
        self.stream_market_data(&channels).map(Some)
    }

    fn validate_channels(channels: &[String]) -> Result<Vec<String>, ValidationError> {
        if channels.is_empty() {
            return Err(ValidationError::EmptyField("channel"));
        }
        channels
            .iter()
            .map(|c| require_non_empty("channel", c).map(|_| c.trim().to_string()))
            .collect()
    }

    // --- Queries ---

    pub fn order_history_by_currency(&self, currency: &str, count: u32) -> Result<u64, OrderError> {
        require_non_empty("currency", currency)?;
        self.dispatch_query(Command::OrderHistoryByCurrency {
            currency: currency.to_string(),
            count,
        })
    }

    pub fn order_history_by_instrument(
        &self,
        instrument: &str,
        count: u32,
    ) -> Result<u64, OrderError> {
        require_non_empty("instrument", instrument)?;
        self.dispatch_query(Command::OrderHistoryByInstrument {
            instrument: instrument.to_string(),
            count,
        })
    }

    pub fn book_summary_by_instrument(&self, instrument: &str) -> Result<u64, OrderError> {
        require_non_empty("instrument", instrument)?;
        self.dispatch_query(Command::BookSummaryByInstrument {
            instrument: instrument.to_string(),
        })
    }

    pub fn book_summary_by_currency(
        &self,
        currency: &str,
        kind: Option<&str>,
    ) -> Result<u64, OrderError> {
        require_non_empty("currency", currency)?;
        self.dispatch_query(Command::BookSummaryByCurrency {
            currency: currency.to_string(),
            kind: kind.map(str::to_string),
        })
    }

    pub fn ticker(&self, instrument: &str) -> Result<u64, OrderError> {
        require_non_empty("instrument", instrument)?;
        self.dispatch_query(Command::Ticker {
            instrument: instrument.to_string(),
        })
    }

    pub fn contract_size(&self, instrument: &str) -> Result<u64, OrderError> {
        require_non_empty("instrument", instrument)?;
        self.dispatch_query(Command::ContractSize {
            instrument: instrument.to_string(),
        })
    }

    pub fn currencies(&self) -> Result<u64, OrderError> {
        self.dispatch_query(Command::Currencies)
    }

    fn dispatch_query(&self, command: Command) -> Result<u64, OrderError> {
        self.dispatch(command, None)
    }

    // --- Session ---

    /// Send `public/auth`. The reply moves the connection to `Authenticated`.
    pub fn authenticate(&self, authenticator: &Authenticator) -> Result<u64, OrderError> {
        let grant = authenticator.grant(now_ms())?;
        self.dispatch(Command::Authenticate(grant), None)
    }

    pub fn set_heartbeat(&self, interval: Duration) -> Result<u64, OrderError> {
        self.dispatch(
            Command::SetHeartbeat {
                interval_secs: interval.as_secs(),
            },
            None,
        )
    }

    /// Feed one inbound frame to the reconciliation engine, answering
    /// heartbeat test requests.
    pub fn handle_frame(&self, text: &str) {
        if let Some(reply) = self.engine.handle_frame(text) {
            if let Err(e) = self.dispatch(reply, None) {
                warn!(error = %e, "failed to answer heartbeat");
            }
        }
    }

    /// Time out unanswered requests.
    pub fn reap_expired(&self, timeout: Duration) -> Vec<LedgerEntry> {
        self.engine.reap_expired(timeout.as_millis() as i64)
    }

    // --- Read side ---

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.store.get(order_id)
    }

    pub fn list_orders(&self) -> Vec<Order> {
        self.store.list()
    }

    pub fn positions_snapshot(&self) -> BTreeMap<String, Decimal> {
        self.positions.positions_snapshot()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.positions()
    }

    /// Channels the venue has confirmed.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.read().iter().cloned().collect()
    }

    pub fn in_flight(&self) -> usize {
        self.ledger.len()
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &SharedOrderStore {
        &self.store
    }

    // --- Outbound path ---

    fn dispatch(&self, command: Command, order_id: Option<&str>) -> Result<u64, OrderError> {
        let envelope = self.codec.encode(&command)?;
        let correlation_id = envelope.correlation_id;

        let mut entry = LedgerEntry::new(correlation_id, command.kind(), now_ms());
        if let Some(order_id) = order_id {
            entry = entry.with_order(order_id);
        }
        self.ledger
            .register(entry)
            .map_err(|collision| OrderError::CorrelationCollision(collision.0))?;

        if let Err(e) = self.sink.send(envelope.text) {
            self.ledger.remove(correlation_id);
            self.metrics.inc_transport_errors();
            warn!(correlation_id, method = envelope.method, error = %e, "send failed");
            return Err(OrderError::TransportUnavailable(e));
        }

        self.metrics.inc_requests_sent();
        debug!(correlation_id, method = envelope.method, order_id = ?order_id, "request sent");
        Ok(correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use connector_core::{ConnectionState, ConnectionStatus};
    use execution_core::{CommandKind, OrderKind, OrderSide, OrderStatus};
    use metrics::create_metrics;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::test_support::{harness, market, order_json, RecordingSink};

    #[test]
    fn test_place_sends_and_tracks() {
        let h = harness();
        let id = h
            .manager
            .place(market("O1", OrderSide::Buy, dec!(10)))
            .unwrap();

        let sent = h.last_sent();
        assert_eq!(sent["id"], id);
        assert_eq!(sent["method"], "private/buy");
        assert_eq!(sent["params"]["instrument_name"], "BTC-PERPETUAL");
        assert_eq!(sent["params"]["type"], "market");
        assert_eq!(sent["params"]["label"], "O1");

        let order = h.manager.get_order("O1").unwrap();
        assert_eq!(order.status, OrderStatus::PendingNew);
        assert_eq!(order.venue_order_id, None);
        assert_eq!(h.manager.in_flight(), 1);
        assert_eq!(h.manager.metrics().requests_sent(), 1);
    }

    #[test]
    fn test_place_validation() {
        let h = harness();

        let err = h.manager.place(market("", OrderSide::Buy, dec!(1))).unwrap_err();
        assert!(matches!(err, OrderError::Validation(ValidationError::EmptyOrderId)));

        let err = h.manager.place(market("O1", OrderSide::Buy, dec!(0))).unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::NonPositiveAmount(_))
        ));

        let mut limit = market("O2", OrderSide::Sell, dec!(1));
        limit.kind = OrderKind::Limit;
        let err = h.manager.place(limit.clone()).unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::MissingPrice(OrderKind::Limit))
        ));
        let err = h.manager.place(limit.with_price(dec!(-5))).unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::NonPositivePrice(_))
        ));

        let mut stop = market("O3", OrderSide::Sell, dec!(1));
        stop.kind = OrderKind::StopMarket;
        let err = h.manager.place(stop).unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::MissingTriggerPrice(OrderKind::StopMarket))
        ));

        assert!(h.sink.frames().is_empty());
        assert!(h.manager.list_orders().is_empty());
    }

    #[test]
    fn test_duplicate_order_id() {
        let h = harness();
        h.manager
            .place(market("O1", OrderSide::Buy, dec!(1)))
            .unwrap();

        let err = h
            .manager
            .place(market("O1", OrderSide::Sell, dec!(2)))
            .unwrap_err();

        assert!(matches!(err, OrderError::DuplicateOrder(ref id) if id == "O1"));
        assert_eq!(h.manager.get_order("O1").unwrap().side, OrderSide::Buy);
        assert_eq!(h.sink.frames().len(), 1);
    }

    #[test]
    fn test_transport_failure_withdraws_order() {
        let h = harness();
        h.sink.set_failing(true);

        let err = h
            .manager
            .place(market("O1", OrderSide::Buy, dec!(1)))
            .unwrap_err();

        assert!(err.is_transport());
        assert!(h.manager.get_order("O1").is_none());
        assert_eq!(h.manager.in_flight(), 0);
        assert_eq!(h.manager.metrics().transport_errors(), 1);

        // The id is free again once the transport recovers.
        h.sink.set_failing(false);
        assert!(h.manager.place(market("O1", OrderSide::Buy, dec!(1))).is_ok());
    }

    #[test]
    fn test_correlation_collision() {
        let status = ConnectionStatus::new();
        status.set(ConnectionState::Connected);
        let (manager, _events) = OrderManager::with_codec(
            RecordingSink::default(),
            status,
            create_metrics(),
            ProtocolCodec::starting_at(7),
        );
        manager
            .ledger
            .register(LedgerEntry::new(7, CommandKind::Test, now_ms()))
            .unwrap();

        let err = manager
            .place(market("O1", OrderSide::Buy, dec!(1)))
            .unwrap_err();

        assert!(matches!(err, OrderError::CorrelationCollision(7)));
        assert!(manager.get_order("O1").is_none());
        assert_eq!(manager.in_flight(), 1);
    }

    #[test]
    fn test_cancel_uses_venue_id_once_known() {
        let h = harness();
        let id = h
            .manager
            .place(market("O1", OrderSide::Buy, dec!(1)))
            .unwrap();
        h.manager.cancel("O1").unwrap();
        assert_eq!(h.last_sent()["params"]["order_id"], "O1");

        h.respond(
            id,
            json!({ "order": order_json("ETH-77", "O1", "open", dec!(1)), "trades": [] }),
        );
        h.manager.cancel("O1").unwrap();
        let sent = h.last_sent();
        assert_eq!(sent["method"], "private/cancel");
        assert_eq!(sent["params"]["order_id"], "ETH-77");
    }

    #[test]
    fn test_cancel_rejects_unknown_and_terminal() {
        let h = harness();
        let err = h.manager.cancel("nope").unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::UnknownOrder(_))
        ));

        let id = h
            .manager
            .place(market("O1", OrderSide::Buy, dec!(1)))
            .unwrap();
        h.respond_error(id, 10009, "not_enough_funds");

        let err = h.manager.cancel("O1").unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::OrderTerminal {
                status: OrderStatus::Rejected,
                ..
            })
        ));
        assert_eq!(h.sink.frames().len(), 1);
    }

    #[test]
    fn test_modify_validation() {
        let h = harness();
        let id = h
            .manager
            .place(market("O1", OrderSide::Buy, dec!(10)))
            .unwrap();
        h.respond(
            id,
            json!({
                "order": order_json("BTC-1", "O1", "open", dec!(10)),
                "trades": [crate::test_support::trade_json("T1", "BTC-1", dec!(4), dec!(100), 1)]
            }),
        );
        let frames_before = h.sink.frames().len();

        let err = h
            .manager
            .modify("O1", ModifyRequest::default())
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::NothingToModify)
        ));

        let err = h
            .manager
            .modify("O1", ModifyRequest::amount(dec!(3)))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::AmountBelowFilled { .. })
        ));

        let err = h
            .manager
            .modify("O1", ModifyRequest::price(dec!(0)))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::NonPositivePrice(_))
        ));

        assert_eq!(h.sink.frames().len(), frames_before);

        h.manager
            .modify("O1", ModifyRequest::amount(dec!(4)))
            .unwrap();
        assert_eq!(h.last_sent()["params"]["amount"], 4.0);
    }

    #[test]
    fn test_private_channels_use_private_subscribe() {
        let h = harness();
        h.manager.subscribe("user.orders.any.any.raw").unwrap();
        assert_eq!(h.last_sent()["method"], "private/subscribe");

        let err = h.manager.subscribe("  ").unwrap_err();
        assert!(matches!(
            err,
            OrderError::Validation(ValidationError::EmptyField("channel"))
        ));
    }

    #[test]
    fn test_resubscribe_merges_confirmed_and_configured() {
        let h = harness();
        assert_eq!(h.manager.resubscribe(&[]).unwrap(), None);

        let id = h.manager.subscribe("ticker.BTC-PERPETUAL.raw").unwrap();
        h.respond(id, json!(["ticker.BTC-PERPETUAL.raw"]));

        h.manager
            .resubscribe(&["user.orders.any.any.raw".to_string()])
            .unwrap()
            .unwrap();

        let sent = h.last_sent();
        assert_eq!(sent["method"], "private/subscribe");
        assert_eq!(
            sent["params"]["channels"],
            json!(["ticker.BTC-PERPETUAL.raw", "user.orders.any.any.raw"])
        );
    }

    #[test]
    fn test_queries() {
        let h = harness();
        h.manager
            .order_history_by_currency("BTC", DEFAULT_HISTORY_COUNT)
            .unwrap();
        let sent = h.last_sent();
        assert_eq!(sent["method"], "private/get_order_history_by_currency");
        assert_eq!(sent["params"]["count"], 10);

        h.manager.book_summary_by_currency("ETH", Some("future")).unwrap();
        assert_eq!(h.last_sent()["params"]["kind"], "future");

        assert!(h.manager.ticker("").is_err());
        assert_eq!(h.manager.in_flight(), 2);
    }

    #[test]
    fn test_set_heartbeat() {
        let h = harness();
        h.manager.set_heartbeat(Duration::from_secs(30)).unwrap();
        let sent = h.last_sent();
        assert_eq!(sent["method"], "public/set_heartbeat");
        assert_eq!(sent["params"]["interval"], 30);
    }
}
