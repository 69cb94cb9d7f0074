//! Reconciliation engine: merges inbound venue messages into the Order Store.
//!
//! The engine is the only writer of order status and trade lists. Every
//! change to one order happens inside a single `OrderStore::update`, so
//! readers see either all of a message's effects or none of them.
//!
//! Nothing here returns an error to the transport. Anomalies become
//! [`Diagnostic`]s: logged at warn level, counted, and published.

use std::collections::BTreeSet;
use std::sync::Arc;

use auth::AuthSession;
use connector_core::{ConnectionState, ConnectionStatus};
use execution_core::{
    CommandKind, FillError, FillOutcome, LedgerEntry, Order, OrderStatus, SharedOrderStore,
    SharedRequestLedger, Trade,
};
use metrics::SharedMetrics;
use parking_lot::RwLock;
use protocol::{
    from_payload, parse_channel_list, ChangesPayload, Command, DecodedMessage, OneOrMany,
    OrderPayload, OrderResultPayload, ProtocolCodec, TradePayload,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{Diagnostic, EventSender, SessionEvent};

const USER_ORDERS_PREFIX: &str = "user.orders.";
const USER_TRADES_PREFIX: &str = "user.trades.";
const USER_CHANGES_PREFIX: &str = "user.changes.";

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Channels the venue has confirmed.
pub type SharedSubscriptions = Arc<RwLock<BTreeSet<String>>>;

/// What one reconciliation step should do to an order.
#[derive(Debug, Default)]
struct Reconcile<'a> {
    payload: Option<&'a OrderPayload>,
    trades: Vec<Trade>,
    /// Venue confirmed a cancel.
    cancelled: bool,
    /// Venue refused the order, with the reason.
    rejected: Option<String>,
}

#[derive(Default)]
struct Reconciled {
    diagnostics: Vec<Diagnostic>,
    fills: u64,
    duplicates: u64,
    changed: Option<Order>,
}

pub struct ReconciliationEngine {
    store: SharedOrderStore,
    ledger: SharedRequestLedger,
    subscriptions: SharedSubscriptions,
    status: ConnectionStatus,
    events: EventSender,
    metrics: SharedMetrics,
}

impl ReconciliationEngine {
    pub fn new(
        store: SharedOrderStore,
        ledger: SharedRequestLedger,
        subscriptions: SharedSubscriptions,
        status: ConnectionStatus,
        events: EventSender,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            ledger,
            subscriptions,
            status,
            events,
            metrics,
        }
    }

    /// Decode and apply one inbound frame.
    ///
    /// Returns a command to send back, which only happens for heartbeat
    /// test requests.
    pub fn handle_frame(&self, text: &str) -> Option<Command> {
        self.metrics.inc_frames_received();
        match ProtocolCodec::decode(text) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                self.metrics.inc_malformed_frames();
                self.report(Diagnostic::MalformedFrame {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    pub fn handle_message(&self, message: DecodedMessage) -> Option<Command> {
        match message {
            DecodedMessage::Result {
                correlation_id,
                payload,
            } => {
                self.on_result(correlation_id, payload);
                None
            }
            DecodedMessage::ProtocolError {
                correlation_id,
                code,
                message,
            } => {
                self.on_error(correlation_id, code, message);
                None
            }
            DecodedMessage::Event { channel, payload } => {
                self.on_event(&channel, payload);
                None
            }
            DecodedMessage::Heartbeat { test_request } => {
                debug!(test_request, "heartbeat");
                test_request.then_some(Command::Test)
            }
        }
    }

    /// Drop ledger entries nobody answered within `timeout_ms`.
    pub fn reap_expired(&self, timeout_ms: i64) -> Vec<LedgerEntry> {
        let expired = self.ledger.reap_expired(timeout_ms, now_ms());
        for entry in &expired {
            self.metrics.inc_request_timeouts();
            self.report(Diagnostic::RequestTimedOut {
                correlation_id: entry.correlation_id,
                kind: entry.kind,
                order_id: entry.order_id.clone(),
            });
        }
        expired
    }

    // --- Responses ---

    fn on_result(&self, correlation_id: u64, payload: Value) {
        let Some(entry) = self.ledger.take(correlation_id) else {
            self.metrics.inc_orphan_messages();
            self.report(Diagnostic::OrphanResponse {
                correlation_id: Some(correlation_id),
            });
            return;
        };

        debug!(correlation_id, kind = %entry.kind, "response received");

        match entry.kind {
            kind if kind.is_query() => {
                self.publish(SessionEvent::QueryResult { kind, payload });
            }
            CommandKind::Cancel => self.on_cancel_result(&entry, &payload),
            kind if kind.targets_order() => self.on_order_result(&entry, &payload),
            CommandKind::Authenticate => self.on_auth_result(&payload),
            CommandKind::Subscribe => match parse_channel_list(&payload) {
                Ok(channels) => self.update_subscriptions(|set| set.extend(channels)),
                Err(e) => self.invalid_payload(Some(correlation_id), e),
            },
            CommandKind::Unsubscribe => match parse_channel_list(&payload) {
                Ok(channels) => self.update_subscriptions(|set| {
                    for channel in &channels {
                        set.remove(channel);
                    }
                }),
                Err(e) => self.invalid_payload(Some(correlation_id), e),
            },
            CommandKind::UnsubscribeAll => self.update_subscriptions(BTreeSet::clear),
            kind => {
                debug!(kind = %kind, result = %payload, "acknowledged");
            }
        }
    }

    fn on_order_result(&self, entry: &LedgerEntry, payload: &Value) {
        let Some(order_id) = entry.order_id.as_deref() else {
            return;
        };
        let result: OrderResultPayload = match from_payload(payload) {
            Ok(result) => result,
            Err(e) => return self.invalid_payload(Some(entry.correlation_id), e),
        };
        let trades = self.convert_trades(Some(entry.correlation_id), &result.trades);
        self.reconcile(
            entry.kind,
            order_id,
            Reconcile {
                payload: Some(&result.order),
                trades,
                ..Default::default()
            },
        );
    }

    fn on_cancel_result(&self, entry: &LedgerEntry, payload: &Value) {
        let Some(order_id) = entry.order_id.as_deref() else {
            return;
        };
        // The cancel itself is confirmed even if the order object is odd.
        let order = from_payload::<OrderPayload>(payload).ok();
        self.reconcile(
            CommandKind::Cancel,
            order_id,
            Reconcile {
                payload: order.as_ref(),
                cancelled: true,
                ..Default::default()
            },
        );
    }

    fn on_auth_result(&self, payload: &Value) {
        match AuthSession::from_payload(payload) {
            Ok(session) => {
                info!(scope = %session.scope, expires_in_secs = session.expires_in_secs, "authenticated");
                self.status.set(ConnectionState::Authenticated);
                self.publish(SessionEvent::Authenticated {
                    scope: session.scope.clone(),
                    expires_in_secs: session.expires_in_secs,
                });
            }
            Err(e) => self.report(Diagnostic::AuthenticationFailed {
                code: 0,
                message: e.to_string(),
            }),
        }
    }

    fn on_error(&self, correlation_id: Option<u64>, code: i64, message: String) {
        self.metrics.inc_protocol_errors();

        let entry = match correlation_id {
            Some(id) => match self.ledger.take(id) {
                Some(entry) => Some(entry),
                None => {
                    self.metrics.inc_orphan_messages();
                    self.report(Diagnostic::OrphanResponse {
                        correlation_id: Some(id),
                    });
                    return;
                }
            },
            None => None,
        };

        if let Some(entry) = &entry {
            match entry.kind {
                CommandKind::Authenticate => {
                    self.report(Diagnostic::AuthenticationFailed { code, message });
                    return;
                }
                CommandKind::Place => {
                    if let Some(order_id) = entry.order_id.as_deref() {
                        self.reconcile(
                            CommandKind::Place,
                            order_id,
                            Reconcile {
                                rejected: Some(format!("{code}: {message}")),
                                ..Default::default()
                            },
                        );
                    }
                }
                _ => {}
            }
        }

        self.report(Diagnostic::ProtocolError {
            correlation_id,
            kind: entry.as_ref().map(|e| e.kind),
            order_id: entry.and_then(|e| e.order_id),
            code,
            message,
        });
    }

    // --- Subscription notifications ---

    fn on_event(&self, channel: &str, payload: Value) {
        if channel.starts_with(USER_ORDERS_PREFIX) {
            match from_payload::<OneOrMany<OrderPayload>>(&payload) {
                Ok(orders) => {
                    for order in orders.into_vec() {
                        self.on_order_event(channel, &order, Vec::new());
                    }
                }
                Err(e) => self.invalid_payload(None, e),
            }
        } else if channel.starts_with(USER_TRADES_PREFIX) {
            match from_payload::<Vec<TradePayload>>(&payload) {
                Ok(trades) => self.on_trade_events(channel, &trades),
                Err(e) => self.invalid_payload(None, e),
            }
        } else if channel.starts_with(USER_CHANGES_PREFIX) {
            match from_payload::<ChangesPayload>(&payload) {
                Ok(changes) => {
                    // Orders first so a new order's venue id is indexed
                    // before its trades are matched.
                    for order in &changes.orders {
                        let trades: Vec<TradePayload> = changes
                            .trades
                            .iter()
                            .filter(|t| t.order_id.as_deref() == Some(order.order_id.as_str()))
                            .cloned()
                            .collect();
                        let trades = self.convert_trades(None, &trades);
                        self.on_order_event(channel, order, trades);
                    }
                    let loose: Vec<TradePayload> = changes
                        .trades
                        .iter()
                        .filter(|t| {
                            !changes
                                .orders
                                .iter()
                                .any(|o| t.order_id.as_deref() == Some(o.order_id.as_str()))
                        })
                        .cloned()
                        .collect();
                    self.on_trade_events(channel, &loose);
                }
                Err(e) => self.invalid_payload(None, e),
            }
        } else {
            self.publish(SessionEvent::MarketData {
                channel: channel.to_string(),
                payload,
            });
        }
    }

    fn on_order_event(&self, channel: &str, order: &OrderPayload, trades: Vec<Trade>) {
        match self.resolve(&order.order_id, order.label()) {
            Some(order_id) => self.reconcile(
                CommandKind::Place,
                &order_id,
                Reconcile {
                    payload: Some(order),
                    trades,
                    ..Default::default()
                },
            ),
            None => self.orphan_event(channel, &order.order_id),
        }
    }

    fn on_trade_events(&self, channel: &str, trades: &[TradePayload]) {
        // Group by venue order id, keeping arrival order.
        let mut groups: Vec<(&str, Option<&str>, Vec<TradePayload>)> = Vec::new();
        for trade in trades {
            let Some(venue_id) = trade.order_id.as_deref() else {
                self.invalid_payload(None, format!("trade {} has no order id", trade.trade_id));
                continue;
            };
            match groups.iter_mut().find(|(id, _, _)| *id == venue_id) {
                Some((_, _, group)) => group.push(trade.clone()),
                None => groups.push((venue_id, trade.label.as_deref(), vec![trade.clone()])),
            }
        }

        for (venue_id, label, group) in groups {
            match self.resolve(venue_id, label.filter(|l| !l.is_empty())) {
                Some(order_id) => {
                    let trades = self.convert_trades(None, &group);
                    self.reconcile(
                        CommandKind::Place,
                        &order_id,
                        Reconcile {
                            trades,
                            ..Default::default()
                        },
                    );
                }
                None => self.orphan_event(channel, venue_id),
            }
        }
    }

    /// Map a venue order id to a local order.
    ///
    /// Before the place response arrives only the wire label (the client id
    /// when no label was given) links the two. It must belong to exactly one
    /// local order, and that order must have no venue id yet.
    fn resolve(&self, venue_order_id: &str, label: Option<&str>) -> Option<String> {
        if let Some(order_id) = self.store.resolve_venue_id(venue_order_id) {
            return Some(order_id);
        }
        let order_id = self.store.resolve_label(label?)?;
        self.store
            .get(&order_id)
            .filter(|o| o.venue_order_id.is_none())
            .map(|o| o.order_id)
    }

    // --- The state machine ---

    fn reconcile(&self, kind: CommandKind, order_id: &str, step: Reconcile<'_>) {
        let at = now_ms();
        let outcome = self
            .store
            .update(order_id, |order| Self::apply(order, &step, at));

        let Some(outcome) = outcome else {
            self.metrics.inc_orphan_messages();
            self.report(Diagnostic::UnknownOrder {
                kind,
                order_id: order_id.to_string(),
            });
            return;
        };

        for _ in 0..outcome.fills {
            self.metrics.inc_fills_applied();
        }
        for _ in 0..outcome.duplicates {
            self.metrics.inc_duplicate_fills();
        }
        for diagnostic in outcome.diagnostics {
            if matches!(
                diagnostic,
                Diagnostic::LateFill { .. } | Diagnostic::Overfill { .. }
            ) {
                self.metrics.inc_rejected_fills();
            }
            self.report(diagnostic);
        }
        if let Some(order) = outcome.changed {
            info!(
                order_id = %order.order_id,
                venue_order_id = ?order.venue_order_id,
                status = %order.status,
                filled = %order.filled_amount,
                "order updated"
            );
            self.publish(SessionEvent::OrderUpdated(Box::new(order)));
        }
    }

    /// Apply one step to an order under the store's write lock.
    fn apply(order: &mut Order, step: &Reconcile<'_>, at: i64) -> Reconciled {
        let before = order.clone();
        let mut out = Reconciled::default();
        let illegal = |order: &Order, to: OrderStatus| Diagnostic::IllegalTransition {
            order_id: order.order_id.clone(),
            from: order.status,
            to,
        };

        let venue_status = step.payload.and_then(OrderPayload::status);
        let rejected = step.rejected.clone().or_else(|| {
            (venue_status == Some(OrderStatus::Rejected)).then(|| {
                step.payload
                    .and_then(|p| p.reject_reason.clone())
                    .unwrap_or_else(|| "rejected".to_string())
            })
        });

        // 1. Acceptance
        if let Some(payload) = step.payload {
            if order.venue_order_id.is_none() {
                order.venue_order_id = Some(payload.order_id.clone());
            }
        }
        let accepted = step.payload.is_some() || step.cancelled || !step.trades.is_empty();
        if order.status == OrderStatus::PendingNew && accepted && rejected.is_none() {
            if let Err(e) = order.acknowledge(None, at) {
                out.diagnostics.push(illegal(order, e.to));
            }
        }
        if let Some(payload) = step.payload {
            Self::sync_fields(order, payload, at, &mut out);
        }

        // 2. Fills
        for trade in &step.trades {
            match order.apply_trade(trade.clone(), at) {
                Ok(FillOutcome::Applied { .. }) => out.fills += 1,
                Ok(FillOutcome::Duplicate) => out.duplicates += 1,
                Err(FillError::Terminal(status)) => out.diagnostics.push(Diagnostic::LateFill {
                    order_id: order.order_id.clone(),
                    trade_id: trade.trade_id.clone(),
                    status,
                }),
                Err(FillError::Overfill {
                    trade_amount,
                    remaining,
                }) => out.diagnostics.push(Diagnostic::Overfill {
                    order_id: order.order_id.clone(),
                    trade_id: trade.trade_id.clone(),
                    trade_amount,
                    remaining,
                }),
                Err(e @ FillError::NonPositiveAmount(_)) => {
                    out.diagnostics.push(Diagnostic::InvalidPayload {
                        correlation_id: None,
                        reason: format!("trade {}: {e}", trade.trade_id),
                    })
                }
            }
        }

        // 3. Terminal outcomes reported by the venue
        let cancelled = step.cancelled || venue_status == Some(OrderStatus::Cancelled);
        if let Some(reason) = rejected {
            if order.status != OrderStatus::Rejected {
                if let Err(e) = order.reject(reason, at) {
                    out.diagnostics.push(illegal(order, e.to));
                }
            }
        } else if cancelled && !order.is_terminal() {
            if let Err(e) = order.transition(OrderStatus::Cancelled, at) {
                out.diagnostics.push(illegal(order, e.to));
            }
        } else if cancelled && order.status != OrderStatus::Cancelled && !step.cancelled {
            // Venue says cancelled, local state already ended differently.
            out.diagnostics.push(illegal(order, OrderStatus::Cancelled));
        }

        if *order != before {
            out.changed = Some(order.clone());
        }
        out
    }

    /// Copy venue-assigned amount, price and average price onto an active order.
    fn sync_fields(order: &mut Order, payload: &OrderPayload, at: i64, out: &mut Reconciled) {
        if order.is_terminal() {
            return;
        }
        let amount = payload.amount.filter(|a| *a > Decimal::ZERO && *a != order.amount);
        let price = payload
            .price
            .filter(|p| order.kind.requires_price() && Some(*p) != order.price);
        if amount.is_some() || price.is_some() {
            if let Err(e) = order.amend(amount, price, at) {
                out.diagnostics.push(Diagnostic::AmendmentIgnored {
                    order_id: order.order_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
        if order.trades.is_empty() {
            if let Some(avg) = payload.average_price.filter(|p| *p > Decimal::ZERO) {
                order.average_price = Some(avg);
                order.updated_at_ms = at;
            }
        }
    }

    // --- Helpers ---

    fn convert_trades(&self, correlation_id: Option<u64>, trades: &[TradePayload]) -> Vec<Trade> {
        trades
            .iter()
            .filter_map(|t| match t.to_trade() {
                Ok(trade) => Some(trade),
                Err(e) => {
                    self.invalid_payload(correlation_id, e);
                    None
                }
            })
            .collect()
    }

    fn update_subscriptions(&self, change: impl FnOnce(&mut BTreeSet<String>)) {
        let channels: Vec<String> = {
            let mut set = self.subscriptions.write();
            change(&mut set);
            set.iter().cloned().collect()
        };
        info!(channels = ?channels, "subscriptions updated");
        self.publish(SessionEvent::SubscriptionsChanged(channels));
    }

    fn orphan_event(&self, channel: &str, venue_order_id: &str) {
        self.metrics.inc_orphan_messages();
        self.report(Diagnostic::OrphanEvent {
            channel: channel.to_string(),
            venue_order_id: venue_order_id.to_string(),
        });
    }

    fn invalid_payload(&self, correlation_id: Option<u64>, reason: impl ToString) {
        self.report(Diagnostic::InvalidPayload {
            correlation_id,
            reason: reason.to_string(),
        });
    }

    fn report(&self, diagnostic: Diagnostic) {
        warn!(%diagnostic, "reconciliation diagnostic");
        self.publish(SessionEvent::Diagnostic(diagnostic));
    }

    fn publish(&self, event: SessionEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }
}
