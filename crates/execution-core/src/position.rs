//! Position view derived from the Order Store.
//!
//! Positions are never stored or mutated on their own. Each call folds the
//! trades of every order under one store read lock, so a snapshot never sees
//! half of a concurrent update.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderSide};
use crate::store::SharedOrderStore;
use crate::trade::Trade;

/// A position in a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    /// Net amount (positive = long, negative = short).
    pub net_amount: Decimal,
    /// Amount-weighted average entry price of the open amount.
    pub avg_entry_price: Decimal,
    /// Realized PnL from closed amounts.
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub last_update_ms: i64,
}

impl Position {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            net_amount: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            last_update_ms: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net_amount == Decimal::ZERO
    }

    pub fn is_long(&self) -> bool {
        self.net_amount > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.net_amount < Decimal::ZERO
    }

    /// Unrealized PnL at a mark price.
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        if self.is_flat() {
            Decimal::ZERO
        } else {
            (mark_price - self.avg_entry_price) * self.net_amount
        }
    }

    /// Fold one trade into the position.
    pub fn apply_trade(&mut self, trade: &Trade) {
        if trade.amount == Decimal::ZERO {
            return;
        }

        self.total_fees += trade.fee;
        self.last_update_ms = self.last_update_ms.max(trade.timestamp_ms);

        let delta = trade.signed_amount();
        let old = self.net_amount;
        let new = old + delta;

        if old == Decimal::ZERO {
            self.avg_entry_price = trade.price;
        } else if (old > Decimal::ZERO) == (delta > Decimal::ZERO) {
            // Adding to the position
            let old_cost = old.abs() * self.avg_entry_price;
            let total = old.abs() + trade.amount;
            self.avg_entry_price = (old_cost + trade.notional()) / total;
        } else {
            // Reducing or reversing
            let closed = trade.amount.min(old.abs());
            self.realized_pnl += match trade.direction {
                OrderSide::Sell => (trade.price - self.avg_entry_price) * closed,
                OrderSide::Buy => (self.avg_entry_price - trade.price) * closed,
            };
            if new != Decimal::ZERO && new.is_sign_positive() != old.is_sign_positive() {
                self.avg_entry_price = trade.price;
            }
        }

        self.net_amount = new;
        if self.is_flat() {
            self.avg_entry_price = Decimal::ZERO;
        }
    }
}

fn trades_in_time_order<'a>(orders: impl Iterator<Item = &'a Order>) -> BTreeMap<String, Vec<&'a Trade>> {
    let mut by_instrument: BTreeMap<String, Vec<&'a Trade>> = BTreeMap::new();
    for order in orders {
        by_instrument
            .entry(order.instrument.clone())
            .or_default()
            .extend(order.trades.iter());
    }
    for trades in by_instrument.values_mut() {
        trades.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });
    }
    by_instrument
}

/// Read-only projection of the Order Store into positions.
#[derive(Clone)]
pub struct PositionAggregator {
    store: SharedOrderStore,
}

impl PositionAggregator {
    pub fn new(store: SharedOrderStore) -> Self {
        Self { store }
    }

    /// Instrument -> signed executed amount (buys positive, sells negative).
    ///
    /// Instruments whose orders have no trades do not appear.
    pub fn positions_snapshot(&self) -> BTreeMap<String, Decimal> {
        self.store.with_orders(|orders| {
            let mut snapshot = BTreeMap::new();
            for order in orders.filter(|o| !o.trades.is_empty()) {
                let net: Decimal = order.trades.iter().map(Trade::signed_amount).sum();
                *snapshot
                    .entry(order.instrument.clone())
                    .or_insert(Decimal::ZERO) += net;
            }
            snapshot
        })
    }

    /// Full position detail per instrument, trades folded in venue time order.
    pub fn positions(&self) -> Vec<Position> {
        self.store.with_orders(|orders| {
            trades_in_time_order(orders)
                .into_iter()
                .filter(|(_, trades)| !trades.is_empty())
                .map(|(instrument, trades)| {
                    let mut position = Position::new(instrument);
                    for trade in trades {
                        position.apply_trade(trade);
                    }
                    position
                })
                .collect()
        })
    }

    pub fn position(&self, instrument: &str) -> Option<Position> {
        self.positions()
            .into_iter()
            .find(|p| p.instrument == instrument)
    }

    /// Net amount for one instrument (0 if never traded).
    pub fn net_amount(&self, instrument: &str) -> Decimal {
        self.store.with_orders(|orders| {
            orders
                .filter(|o| o.instrument == instrument)
                .flat_map(|o| o.trades.iter())
                .map(Trade::signed_amount)
                .sum()
        })
    }

    /// Realized PnL summed over all instruments.
    pub fn total_realized_pnl(&self) -> Decimal {
        self.positions().iter().map(|p| p.realized_pnl).sum()
    }

    /// Unrealized PnL for every instrument `mark_fn` can price.
    pub fn total_unrealized_pnl<F>(&self, mark_fn: F) -> Decimal
    where
        F: Fn(&str) -> Option<Decimal>,
    {
        self.positions()
            .iter()
            .filter_map(|p| mark_fn(&p.instrument).map(|mark| p.unrealized_pnl(mark)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{InstrumentKind, OrderDraft, OrderKind};
    use crate::store::create_order_store;
    use rust_decimal_macros::dec;

    fn fill(t: &mut Position, side: OrderSide, amount: Decimal, price: Decimal, ts: i64) {
        t.apply_trade(&Trade::new(format!("T{ts}"), price, amount, side, ts));
    }

    fn filled_order(
        id: &str,
        instrument: &str,
        side: OrderSide,
        trades: &[(&str, Decimal, Decimal, i64)],
    ) -> Order {
        let total: Decimal = trades.iter().map(|(_, a, _, _)| *a).sum();
        let mut order = Order::from_draft(
            OrderDraft::new(id, instrument, InstrumentKind::Futures, side, OrderKind::Market, total),
            0,
        );
        order.acknowledge(None, 0).unwrap();
        for (trade_id, amount, price, ts) in trades {
            order
                .apply_trade(
                    Trade::new(*trade_id, *price, *amount, side, *ts).with_fee(dec!(0.5), "USD"),
                    *ts,
                )
                .unwrap();
        }
        order
    }

    #[test]
    fn test_position_open_and_close() {
        let mut pos = Position::new("BTC-PERPETUAL");
        fill(&mut pos, OrderSide::Buy, dec!(1), dec!(50000), 1);
        assert!(pos.is_long());
        assert_eq!(pos.avg_entry_price, dec!(50000));

        fill(&mut pos, OrderSide::Sell, dec!(1), dec!(51000), 2);
        assert!(pos.is_flat());
        assert_eq!(pos.realized_pnl, dec!(1000));
        assert_eq!(pos.avg_entry_price, dec!(0));
    }

    #[test]
    fn test_position_add_and_partial_close() {
        let mut pos = Position::new("BTC-PERPETUAL");
        fill(&mut pos, OrderSide::Buy, dec!(1), dec!(50000), 1);
        fill(&mut pos, OrderSide::Buy, dec!(1), dec!(52000), 2);
        assert_eq!(pos.avg_entry_price, dec!(51000));

        fill(&mut pos, OrderSide::Sell, dec!(1), dec!(53000), 3);
        assert_eq!(pos.net_amount, dec!(1));
        assert_eq!(pos.avg_entry_price, dec!(51000));
        assert_eq!(pos.realized_pnl, dec!(2000));
        assert_eq!(pos.unrealized_pnl(dec!(50000)), dec!(-1000));
    }

    #[test]
    fn test_position_reversal_and_short() {
        let mut pos = Position::new("ETH-PERPETUAL");
        fill(&mut pos, OrderSide::Buy, dec!(1), dec!(3000), 1);
        fill(&mut pos, OrderSide::Sell, dec!(3), dec!(3100), 2);

        assert!(pos.is_short());
        assert_eq!(pos.net_amount, dec!(-2));
        assert_eq!(pos.avg_entry_price, dec!(3100));
        assert_eq!(pos.realized_pnl, dec!(100));

        fill(&mut pos, OrderSide::Buy, dec!(2), dec!(3000), 3);
        assert!(pos.is_flat());
        assert_eq!(pos.realized_pnl, dec!(300));
    }

    #[test]
    fn test_snapshot_sums_signed_trades() {
        let store = create_order_store();
        store
            .create(filled_order(
                "O1",
                "BTC-PERPETUAL",
                OrderSide::Buy,
                &[("T1", dec!(3), dec!(100), 1), ("T2", dec!(7), dec!(200), 2)],
            ))
            .unwrap();
        store
            .create(filled_order("O2", "BTC-PERPETUAL", OrderSide::Sell, &[("T3", dec!(4), dec!(210), 3)]))
            .unwrap();
        store
            .create(filled_order("O3", "ETH-PERPETUAL", OrderSide::Sell, &[("T4", dec!(2), dec!(3000), 4)]))
            .unwrap();
        // no trades, must not appear
        store
            .create(Order::from_draft(
                OrderDraft::new("O4", "SOL-PERPETUAL", InstrumentKind::Futures, OrderSide::Buy, OrderKind::Market, dec!(1)),
                0,
            ))
            .unwrap();

        let aggregator = PositionAggregator::new(store);
        let snapshot = aggregator.positions_snapshot();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["BTC-PERPETUAL"], dec!(6));
        assert_eq!(snapshot["ETH-PERPETUAL"], dec!(-2));
        assert_eq!(aggregator.net_amount("BTC-PERPETUAL"), dec!(6));
        assert_eq!(aggregator.net_amount("SOL-PERPETUAL"), dec!(0));
    }

    #[test]
    fn test_positions_detail() {
        let store = create_order_store();
        store
            .create(filled_order("O1", "BTC-PERPETUAL", OrderSide::Buy, &[("T1", dec!(2), dec!(100), 1)]))
            .unwrap();
        store
            .create(filled_order("O2", "BTC-PERPETUAL", OrderSide::Sell, &[("T2", dec!(1), dec!(130), 2)]))
            .unwrap();

        let aggregator = PositionAggregator::new(store);
        let pos = aggregator.position("BTC-PERPETUAL").unwrap();

        assert_eq!(pos.net_amount, dec!(1));
        assert_eq!(pos.avg_entry_price, dec!(100));
        assert_eq!(pos.realized_pnl, dec!(30));
        assert_eq!(pos.total_fees, dec!(1.0));
        assert_eq!(aggregator.total_realized_pnl(), dec!(30));
        assert_eq!(
            aggregator.total_unrealized_pnl(|i| (i == "BTC-PERPETUAL").then_some(dec!(120))),
            dec!(20)
        );
    }
}
