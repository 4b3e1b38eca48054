use super::{check_item, check_order, LoadedOrders, OrderStore, SkippedOrder, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use domain::Order;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<String, Order>,
    next_order_id: i64,
    next_item_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    fail_next_persist: bool,
    unreadable_items: HashSet<String>,
}

/// In-process order store with the same transactional contract as the
/// Postgres store, plus fault injection for exercising failure paths.
///
/// A persist is staged on a private copy of the order and only installed
/// once every item has been accepted, so a failure at any step leaves the
/// stored state untouched.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.faults).unavailable = unavailable;
    }

    /// Fail the next `persist` while writing items, after the order row was
    /// staged and its old items were dropped.
    pub fn fail_next_persist(&self) {
        lock(&self.faults).fail_next_persist = true;
    }

    /// Make the items of `order_uid` unreadable during `load_all`.
    pub fn fail_items_for(&self, order_uid: &str) {
        lock(&self.faults).unreadable_items.insert(order_uid.to_string());
    }

    pub fn get(&self, order_uid: &str) -> Option<Order> {
        lock(&self.state).orders.get(order_uid).cloned()
    }

    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Number of item rows stored across all orders.
    pub fn item_count(&self) -> usize {
        lock(&self.state)
            .orders
            .values()
            .map(|order| order.items.len())
            .sum()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if lock(&self.faults).unavailable {
            return Err(StoreError::Unavailable("store is unavailable".to_string()));
        }
        Ok(())
    }

    fn take_persist_fault(&self) -> bool {
        std::mem::take(&mut lock(&self.faults).fail_next_persist)
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn persist(&self, mut order: Order) -> Result<Order, StoreError> {
        check_order(&order)?;
        self.check_available()?;
        let inject_fault = self.take_persist_fault();

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let now = Utc::now();

        // Step 1: upsert, keeping id and created_at of an existing row.
        let existing = state
            .orders
            .get(&order.order_uid)
            .map(|stored| (stored.id, stored.created_at));
        match existing {
            Some((id, created_at)) => {
                order.id = id;
                order.created_at = created_at;
            }
            None => {
                state.next_order_id += 1;
                order.id = Some(state.next_order_id);
                order.created_at = Some(now);
            }
        }
        order.updated_at = Some(now);

        // Steps 2 and 3: the staged order starts with no items, then gets
        // the new ones.
        let items = std::mem::take(&mut order.items);
        for mut item in items {
            if inject_fault {
                return Err(StoreError::Unavailable(format!(
                    "injected failure while writing items of {}",
                    order.order_uid
                )));
            }
            check_item(&order.order_uid, &item)?;

            state.next_item_id += 1;
            item.id = Some(state.next_item_id);
            item.created_at = Some(now);
            order.items.push(item);
        }
        if inject_fault {
            return Err(StoreError::Unavailable(format!(
                "injected failure while committing {}",
                order.order_uid
            )));
        }

        state.orders.insert(order.order_uid.clone(), order.clone());
        debug!(order_uid = %order.order_uid, items = order.items.len(), "Order committed in memory");

        Ok(order)
    }

    async fn load_all(&self) -> Result<LoadedOrders, StoreError> {
        self.check_available()?;

        let unreadable = lock(&self.faults).unreadable_items.clone();
        let state = lock(&self.state);
        let mut loaded = LoadedOrders::default();

        for order in state.orders.values() {
            if unreadable.contains(&order.order_uid) {
                warn!(order_uid = %order.order_uid, "Skipping order whose items could not be read");
                loaded.skipped.push(SkippedOrder {
                    order_uid: order.order_uid.clone(),
                    reason: "items unreadable".to_string(),
                });
                continue;
            }
            loaded.orders.push(order.clone());
        }

        Ok(loaded)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Item;
    use tokio_test::{assert_err, assert_ok};

    fn order(uid: &str, chrt_ids: &[i64]) -> Order {
        Order {
            order_uid: uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            items: chrt_ids
                .iter()
                .map(|chrt_id| Item {
                    order_uid: uid.to_string(),
                    chrt_id: *chrt_id,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_persist_assigns_bookkeeping() {
        let store = InMemoryOrderStore::new();
        let stored = assert_ok!(store.persist(order("A1", &[1, 2])).await);

        assert!(stored.is_persisted());
        assert!(stored.created_at.is_some());
        assert!(stored.items.iter().all(|item| item.id.is_some()));
        assert_eq!(store.get("A1"), Some(stored));
    }

    #[tokio::test]
    async fn test_upsert_replaces_items_and_keeps_identity() {
        let store = InMemoryOrderStore::new();
        let first = store.persist(order("A1", &[1, 2, 3])).await.unwrap();

        let mut update = order("A1", &[9]);
        update.track_number = "UPDATED".to_string();
        let second = store.persist(update).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.item_count(), 1);

        let stored = store.get("A1").unwrap();
        assert_eq!(stored.track_number, "UPDATED");
        assert_eq!(stored.items[0].chrt_id, 9);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_state_unchanged() {
        let store = InMemoryOrderStore::new();
        let before = store.persist(order("A1", &[1, 2])).await.unwrap();

        store.fail_next_persist();
        let mut update = order("A1", &[7]);
        update.entry = "changed".to_string();
        assert_err!(store.persist(update).await);

        assert_eq!(store.get("A1"), Some(before));
        assert_eq!(store.item_count(), 2);

        // the fault is one-shot
        assert_ok!(store.persist(order("A1", &[7])).await);
    }

    #[tokio::test]
    async fn test_bad_item_rolls_back_new_order() {
        let store = InMemoryOrderStore::new();
        let mut bad = order("A1", &[1]);
        bad.items.push(Item::default());

        let err = store.persist(bad).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn test_load_all_skips_unreadable_items() {
        let store = InMemoryOrderStore::new();
        store.persist(order("A1", &[1])).await.unwrap();
        store.persist(order("B2", &[2, 3])).await.unwrap();
        store.fail_items_for("A1");

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.orders.len(), 1);
        assert_eq!(loaded.orders[0].order_uid, "B2");
        assert_eq!(loaded.orders[0].items.len(), 2);
        assert_eq!(loaded.skipped.len(), 1);
        assert_eq!(loaded.skipped[0].order_uid, "A1");
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_load_all() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.load_all().await, Err(StoreError::Unavailable(_))));
        assert_err!(store.persist(order("A1", &[])).await);
    }
}
