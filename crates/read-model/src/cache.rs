use common::metrics::{record_cache_request, set_cache_entries};
use domain::Order;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory projection of every order in the store, keyed by `order_uid`.
///
/// Entries are immutable `Arc<Order>` values swapped in whole, so a reader
/// sees either the previous version of an order or the new one, never a mix.
/// There is no eviction: the cache holds one entry per stored order.
///
/// Lifecycle: [`OrderCache::new`], then [`crate::rehydrate`] once, then
/// shared behind an `Arc` with the ingestion pipeline and the HTTP layer.
#[derive(Debug, Default)]
pub struct OrderCache {
    entries: RwLock<HashMap<String, Arc<Order>>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup.
    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let found = self.entries.read().await.get(order_uid).cloned();
        record_cache_request("get", found.is_some());
        found
    }

    /// Snapshot of all entries, in no particular order.
    pub async fn list(&self) -> Vec<Arc<Order>> {
        let entries = self.entries.read().await;
        record_cache_request("list", true);
        entries.values().cloned().collect()
    }

    /// Insert or replace the entry for `order.order_uid`, returning the
    /// installed value.
    pub async fn put(&self, order: Order) -> Arc<Order> {
        let entry = Arc::new(order);

        let mut entries = self.entries.write().await;
        let replaced = entries
            .insert(entry.order_uid.clone(), entry.clone())
            .is_some();
        set_cache_entries(entries.len());
        drop(entries);

        debug!(
            order_uid = %entry.order_uid,
            items = entry.items.len(),
            replaced,
            "Cache entry installed"
        );
        entry
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Item;

    fn order(uid: &str, items: usize) -> Order {
        Order {
            order_uid: uid.to_string(),
            items: (0..items)
                .map(|i| Item {
                    order_uid: uid.to_string(),
                    chrt_id: i as i64,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let cache = OrderCache::new();
        assert!(cache.get("nope").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces_whole_entry() {
        let cache = OrderCache::new();
        cache.put(order("A1", 3)).await;

        let old = cache.get("A1").await.unwrap();
        cache.put(order("A1", 1)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("A1").await.unwrap().items.len(), 1);
        // a reader holding the old entry still sees it intact
        assert_eq!(old.items.len(), 3);
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let cache = OrderCache::new();
        cache.put(order("A1", 1)).await;
        cache.put(order("B2", 2)).await;

        let snapshot = cache.list().await;
        cache.put(order("C3", 0)).await;

        assert_eq!(snapshot.len(), 2);
        assert_eq!(cache.list().await.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_partial_entries() {
        let cache = Arc::new(OrderCache::new());
        cache.put(order("A1", 2)).await;

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for round in 0..200 {
                    let items = if round % 2 == 0 { 5 } else { 2 };
                    cache.put(order("A1", items)).await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let entry = cache.get("A1").await.unwrap();
                    assert!(entry.items.len() == 2 || entry.items.len() == 5);
                    assert!(entry.items.iter().all(|item| item.order_uid == "A1"));
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
