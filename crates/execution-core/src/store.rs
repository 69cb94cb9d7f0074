//! The Order Store: every locally known order keyed by client order id.
//!
//! A single `RwLock` guards the order map and both indexes, so `update` is
//! atomic with respect to readers and `with_orders` gives callers a
//! consistent view across all orders at once.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::order::{Order, OrderStatus};

#[derive(Default)]
struct StoreInner {
    orders: HashMap<String, Order>,
    /// venue order id -> client order id
    venue_index: HashMap<String, String>,
    /// wire label -> client order id, `None` once two orders share a label
    label_index: HashMap<String, Option<String>>,
}

impl StoreInner {
    fn index(&mut self, order: &Order) {
        if let Some(venue_id) = &order.venue_order_id {
            self.venue_index
                .insert(venue_id.clone(), order.order_id.clone());
        }
        match self.label_index.entry(order.wire_label().to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Some(order.order_id.clone()));
            }
            Entry::Occupied(mut slot) => {
                slot.insert(None);
            }
        }
    }

    fn unindex_label(&mut self, order: &Order) {
        let label = order.wire_label();
        if self.label_index.get(label) == Some(&Some(order.order_id.clone())) {
            self.label_index.remove(label);
        }
    }
}

/// Thread-safe order store.
#[derive(Default)]
pub struct OrderStore {
    inner: RwLock<StoreInner>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new order. Existing entries are never overwritten.
    pub fn create(&self, order: Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.orders.contains_key(&order.order_id) {
            return Err(StoreError::DuplicateOrder(order.order_id));
        }
        inner.index(&order);
        inner.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Point-in-time copy of one order.
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.inner.read().orders.get(order_id).cloned()
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.inner.read().orders.contains_key(order_id)
    }

    /// Run `mutator` against the order under the write lock.
    ///
    /// Returns `None` if the order does not exist. The order id and label
    /// cannot be changed by the mutator. A new venue id replaces the old one
    /// in the index.
    pub fn update<R>(&self, order_id: &str, mutator: impl FnOnce(&mut Order) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        let order = inner.orders.get_mut(order_id)?;
        let previous_venue_id = order.venue_order_id.clone();
        let label = order.label.clone();
        let result = mutator(order);
        order.order_id = order_id.to_string();
        order.label = label;
        let venue_id = order.venue_order_id.clone();

        if venue_id != previous_venue_id {
            if let Some(old) = previous_venue_id {
                if inner.venue_index.get(&old).map(String::as_str) == Some(order_id) {
                    inner.venue_index.remove(&old);
                }
            }
            if let Some(new) = venue_id {
                inner.venue_index.insert(new, order_id.to_string());
            }
        }
        Some(result)
    }

    /// Map a venue order id to the local order id.
    pub fn resolve_venue_id(&self, venue_order_id: &str) -> Option<String> {
        self.inner.read().venue_index.get(venue_order_id).cloned()
    }

    /// Map a wire label to the one local order that sent it.
    ///
    /// A label shared by several orders resolves to nothing.
    pub fn resolve_label(&self, label: &str) -> Option<String> {
        self.inner.read().label_index.get(label).cloned().flatten()
    }

    /// Remove an order that was inserted but never reached the venue.
    ///
    /// Only `PendingNew` orders without a venue id can be withdrawn; anything
    /// else stays, since the store keeps every order the venue has seen.
    pub fn withdraw_unsent(&self, order_id: &str) -> Option<Order> {
        let mut inner = self.inner.write();
        let removable = inner
            .orders
            .get(order_id)
            .is_some_and(|o| o.status == OrderStatus::PendingNew && o.venue_order_id.is_none());
        if !removable {
            return None;
        }
        let order = inner.orders.remove(order_id)?;
        inner.unindex_label(&order);
        Some(order)
    }

    /// Snapshot of all orders, sorted by creation time then id.
    pub fn list(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.inner.read().orders.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        orders
    }

    /// Run `f` over all orders under a single read lock.
    pub fn with_orders<R>(&self, f: impl FnOnce(&mut dyn Iterator<Item = &Order>) -> R) -> R {
        let inner = self.inner.read();
        let mut iter = inner.orders.values();
        f(&mut iter)
    }

    /// Orders not yet in a terminal status.
    pub fn active_orders(&self) -> Vec<Order> {
        self.with_orders(|orders| orders.filter(|o| o.status.is_active()).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared order store type.
pub type SharedOrderStore = Arc<OrderStore>;

/// Create a new shared order store.
pub fn create_order_store() -> SharedOrderStore {
    Arc::new(OrderStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{InstrumentKind, OrderDraft, OrderKind, OrderSide};
    use rust_decimal_macros::dec;

    fn order(id: &str, created_at_ms: i64) -> Order {
        Order::from_draft(
            OrderDraft::new(
                id,
                "BTC-PERPETUAL",
                InstrumentKind::Futures,
                OrderSide::Buy,
                OrderKind::Limit,
                dec!(10),
            )
            .with_price(dec!(50000)),
            created_at_ms,
        )
    }

    fn labelled(id: &str, label: &str) -> Order {
        Order {
            label: Some(label.into()),
            ..order(id, 1)
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();

        let got = store.get("O1").unwrap();
        assert_eq!(got.status, OrderStatus::PendingNew);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_rejected_without_overwrite() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();

        let mut other = order("O1", 2);
        other.amount = dec!(99);
        let err = store.create(other).unwrap_err();

        assert_eq!(err, StoreError::DuplicateOrder("O1".into()));
        assert_eq!(store.get("O1").unwrap().amount, dec!(10));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_indexes_venue_id() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();

        let result = store.update("O1", |o| {
            o.order_id = "hijacked".into();
            o.acknowledge(Some("ETH-123".into()), 5)
        });

        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(store.resolve_venue_id("ETH-123").as_deref(), Some("O1"));
        let got = store.get("O1").unwrap();
        assert_eq!(got.order_id, "O1");
        assert_eq!(got.status, OrderStatus::Open);
        assert!(store.update("missing", |_| ()).is_none());
    }

    #[test]
    fn test_replaced_venue_id_is_unindexed() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();
        store.update("O1", |o| o.acknowledge(Some("V1".into()), 2));

        store.update("O1", |o| o.venue_order_id = Some("V2".into()));

        assert_eq!(store.resolve_venue_id("V2").as_deref(), Some("O1"));
        assert!(store.resolve_venue_id("V1").is_none());
    }

    #[test]
    fn test_label_index() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();
        store.create(labelled("O2", "hedge")).unwrap();

        assert_eq!(store.resolve_label("O1").as_deref(), Some("O1"));
        assert_eq!(store.resolve_label("hedge").as_deref(), Some("O2"));
        assert!(store.resolve_label("O2").is_none());

        store.update("O2", |o| o.label = Some("other".into()));
        assert_eq!(store.get("O2").unwrap().label.as_deref(), Some("hedge"));
    }

    #[test]
    fn test_shared_label_resolves_to_nothing() {
        let store = OrderStore::new();
        store.create(labelled("A", "B")).unwrap();
        store.create(order("B", 1)).unwrap();

        assert!(store.resolve_label("B").is_none());
        assert_eq!(store.resolve_label("A"), None);
    }

    #[test]
    fn test_withdraw_releases_label() {
        let store = OrderStore::new();
        store.create(labelled("O1", "grid")).unwrap();
        store.withdraw_unsent("O1");

        store.create(labelled("O2", "grid")).unwrap();
        assert_eq!(store.resolve_label("grid").as_deref(), Some("O2"));
    }

    #[test]
    fn test_list_sorted() {
        let store = OrderStore::new();
        store.create(order("B", 2)).unwrap();
        store.create(order("A", 2)).unwrap();
        store.create(order("C", 1)).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_withdraw_only_unsent() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();
        store.create(order("O2", 1)).unwrap();
        store.update("O2", |o| o.acknowledge(Some("V2".into()), 2));

        assert!(store.withdraw_unsent("O1").is_some());
        assert!(store.withdraw_unsent("O2").is_none());
        assert!(!store.contains("O1"));
        assert!(store.contains("O2"));
    }

    #[test]
    fn test_active_orders() {
        let store = OrderStore::new();
        store.create(order("O1", 1)).unwrap();
        store.create(order("O2", 1)).unwrap();
        store.update("O2", |o| o.reject("no funds", 2));

        let active = store.active_orders();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].order_id, "O1");
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = create_order_store();
        store.create(order("O1", 1)).unwrap();
        store.update("O1", |o| o.acknowledge(None, 1));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let trade = crate::trade::Trade::new(
                        format!("T{i}"),
                        dec!(100),
                        dec!(1),
                        OrderSide::Buy,
                        i,
                    );
                    store.update("O1", |o| o.apply_trade(trade, i));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let got = store.get("O1").unwrap();
        assert_eq!(got.trades.len(), 10);
        assert_eq!(got.filled_amount, dec!(10));
        assert_eq!(got.status, OrderStatus::Filled);
    }
}
