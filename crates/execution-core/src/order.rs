//! Order types, status machine and fill accounting.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AmendError, FillError, TransitionError};
use crate::trade::Trade;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Parse the venue's lowercase direction string.
    pub fn from_venue_str(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }

    pub fn as_venue_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// `1` for buys, `-1` for sells.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

impl FromStr for OrderSide {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_venue_str(&s.to_lowercase()).ok_or(())
    }
}

/// Instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Spot,
    Futures,
    Options,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "Spot",
            Self::Futures => "Futures",
            Self::Options => "Options",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "futures" | "future" => Ok(Self::Futures),
            "options" | "option" => Ok(Self::Options),
            _ => Err(()),
        }
    }
}

/// Order kind, closed over what the venue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    StopLimit,
    TakeLimit,
    Market,
    StopMarket,
    TakeMarket,
    MarketLimit,
    TrailingStop,
}

impl OrderKind {
    pub fn from_venue_str(s: &str) -> Option<Self> {
        match s {
            "limit" => Some(Self::Limit),
            "stop_limit" => Some(Self::StopLimit),
            "take_limit" => Some(Self::TakeLimit),
            "market" => Some(Self::Market),
            "stop_market" => Some(Self::StopMarket),
            "take_market" => Some(Self::TakeMarket),
            "market_limit" => Some(Self::MarketLimit),
            "trailing_stop" => Some(Self::TrailingStop),
            _ => None,
        }
    }

    pub fn as_venue_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::StopLimit => "stop_limit",
            Self::TakeLimit => "take_limit",
            Self::Market => "market",
            Self::StopMarket => "stop_market",
            Self::TakeMarket => "take_market",
            Self::MarketLimit => "market_limit",
            Self::TrailingStop => "trailing_stop",
        }
    }

    /// Kinds that rest at a limit price and cannot be sent without one.
    pub fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit | Self::TakeLimit)
    }

    /// Kinds that activate on a trigger.
    pub fn requires_trigger_price(&self) -> bool {
        matches!(
            self,
            Self::StopLimit
                | Self::TakeLimit
                | Self::StopMarket
                | Self::TakeMarket
                | Self::TrailingStop
        )
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_venue_str())
    }
}

impl FromStr for OrderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_venue_str(&s.to_lowercase()).ok_or(())
    }
}

/// Reference price a trigger order watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerReference {
    IndexPrice,
    MarkPrice,
    LastPrice,
}

impl TriggerReference {
    pub fn from_venue_str(s: &str) -> Option<Self> {
        match s {
            "index_price" => Some(Self::IndexPrice),
            "mark_price" => Some(Self::MarkPrice),
            "last_price" => Some(Self::LastPrice),
            _ => None,
        }
    }

    pub fn as_venue_str(&self) -> &'static str {
        match self {
            Self::IndexPrice => "index_price",
            Self::MarkPrice => "mark_price",
            Self::LastPrice => "last_price",
        }
    }
}

/// Order lifecycle status.
///
/// ```text
/// PendingNew ──► Open ──► PartiallyFilled ──► Filled
///     │           │  │           │  ▲ │
///     ▼           │  └──► Filled │  └─┘
///  Rejected ◄─────┘              ▼
///              Cancelled ◄───────┘ (also from Open)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Inserted locally and sent, venue has not answered yet.
    PendingNew,
    /// Accepted by the venue, nothing filled.
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingNew, Open)
                | (PendingNew, Rejected)
                | (Open, PartiallyFilled)
                | (Open, Filled)
                | (Open, Cancelled)
                | (Open, Rejected)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }

    /// Map the venue's `order_state` field.
    pub fn from_venue_state(s: &str) -> Option<Self> {
        match s {
            "open" | "untriggered" => Some(Self::Open),
            "filled" => Some(Self::Filled),
            "cancelled" => Some(Self::Cancelled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingNew => "pending_new",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Caller-supplied description of an order before it exists in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_id: String,
    pub instrument: String,
    pub instrument_kind: InstrumentKind,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub trigger: Option<TriggerReference>,
    pub label: Option<String>,
}

impl OrderDraft {
    /// Minimal draft; optional fields are set with the `with_*` builders.
    pub fn new(
        order_id: impl Into<String>,
        instrument: impl Into<String>,
        instrument_kind: InstrumentKind,
        side: OrderSide,
        kind: OrderKind,
        amount: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            instrument: instrument.into(),
            instrument_kind,
            side,
            kind,
            amount,
            price: None,
            trigger_price: None,
            trigger: None,
            label: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_trigger(mut self, trigger_price: Decimal, trigger: TriggerReference) -> Self {
        self.trigger_price = Some(trigger_price);
        self.trigger = Some(trigger);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// What a successful [`Order::apply_trade`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The trade was recorded.
    Applied { status: OrderStatus },
    /// A trade with the same id was already recorded; nothing changed.
    Duplicate,
}

/// An order tracked locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Client-assigned id, immutable.
    pub order_id: String,
    /// Venue-assigned id, known once the venue has acknowledged the order.
    pub venue_order_id: Option<String>,
    pub instrument: String,
    pub instrument_kind: InstrumentKind,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Requested amount.
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub trigger: Option<TriggerReference>,
    pub label: Option<String>,
    pub status: OrderStatus,
    pub filled_amount: Decimal,
    /// Amount-weighted mean of recorded trades. `None` until the first fill.
    pub average_price: Option<Decimal>,
    /// Append-only, unique by `trade_id`.
    pub trades: Vec<Trade>,
    pub reject_reason: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Order {
    /// Create a `PendingNew` order from a draft.
    pub fn from_draft(draft: OrderDraft, created_at_ms: i64) -> Self {
        Self {
            order_id: draft.order_id,
            venue_order_id: None,
            instrument: draft.instrument,
            instrument_kind: draft.instrument_kind,
            side: draft.side,
            kind: draft.kind,
            amount: draft.amount,
            price: draft.price,
            trigger_price: draft.trigger_price,
            trigger: draft.trigger,
            label: draft.label,
            status: OrderStatus::PendingNew,
            filled_amount: Decimal::ZERO,
            average_price: None,
            trades: Vec::new(),
            reject_reason: None,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// The label sent with `buy`/`sell`: the explicit label, else the order id.
    pub fn wire_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.order_id)
    }

    pub fn remaining_amount(&self) -> Decimal {
        self.amount - self.filled_amount
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_trade(&self, trade_id: &str) -> bool {
        self.trades.iter().any(|t| t.trade_id == trade_id)
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// A transition to the current status of a non-repeating state is refused
    /// like any other illegal edge; callers check for idempotent cases first.
    pub fn transition(&mut self, next: OrderStatus, at_ms: i64) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at_ms = at_ms;
        Ok(())
    }

    /// Record the venue acknowledgement.
    pub fn acknowledge(&mut self, venue_order_id: Option<String>, at_ms: i64) -> Result<(), TransitionError> {
        if let Some(id) = venue_order_id {
            self.venue_order_id = Some(id);
        }
        if self.status == OrderStatus::PendingNew {
            self.transition(OrderStatus::Open, at_ms)?;
        }
        Ok(())
    }

    /// Move to `Rejected`, keeping the venue's reason.
    pub fn reject(&mut self, reason: impl Into<String>, at_ms: i64) -> Result<(), TransitionError> {
        self.transition(OrderStatus::Rejected, at_ms)?;
        self.reject_reason = Some(reason.into());
        Ok(())
    }

    /// Append a trade and recompute fill state.
    ///
    /// Duplicates (same `trade_id`) are a no-op. A fill on a `PendingNew`
    /// order is proof of acceptance, so the order is opened first.
    pub fn apply_trade(&mut self, trade: Trade, at_ms: i64) -> Result<FillOutcome, FillError> {
        if self.has_trade(&trade.trade_id) {
            return Ok(FillOutcome::Duplicate);
        }
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Rejected) {
            return Err(FillError::Terminal(self.status));
        }
        if trade.amount <= Decimal::ZERO {
            return Err(FillError::NonPositiveAmount(trade.amount));
        }
        if trade.amount > self.remaining_amount() {
            return Err(FillError::Overfill {
                trade_amount: trade.amount,
                remaining: self.remaining_amount(),
            });
        }

        if self.status == OrderStatus::PendingNew {
            self.status = OrderStatus::Open;
        }

        self.filled_amount += trade.amount;
        self.trades.push(trade);
        self.average_price = weighted_average_price(&self.trades);
        self.status = if self.filled_amount == self.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at_ms = at_ms;

        Ok(FillOutcome::Applied {
            status: self.status,
        })
    }

    /// Apply a venue-confirmed change of amount and/or price.
    pub fn amend(
        &mut self,
        amount: Option<Decimal>,
        price: Option<Decimal>,
        at_ms: i64,
    ) -> Result<(), AmendError> {
        if self.is_terminal() {
            return Err(AmendError::Terminal(self.status));
        }
        if let Some(amount) = amount {
            if amount < self.filled_amount {
                return Err(AmendError::BelowFilled {
                    amount,
                    filled: self.filled_amount,
                });
            }
            self.amount = amount;
            // Shrinking to the executed amount completes the order.
            if self.filled_amount == amount
                && matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
                && amount > Decimal::ZERO
            {
                self.status = OrderStatus::Filled;
            }
        }
        if price.is_some() {
            self.price = price;
        }
        self.updated_at_ms = at_ms;
        Ok(())
    }
}

/// Amount-weighted mean price over `trades`, `None` when nothing was executed.
pub fn weighted_average_price(trades: &[Trade]) -> Option<Decimal> {
    let (notional, amount) = trades.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(notional, amount), t| (notional + t.price * t.amount, amount + t.amount),
    );
    (amount > Decimal::ZERO).then(|| notional / amount)
}
