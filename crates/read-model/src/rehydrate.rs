use crate::{OrderCache, ReadModelError};
use chrono::{DateTime, Utc};
use common::metrics::record_rehydration;
use order_store::OrderStore;
use tracing::{info, warn};

/// Statistics for one cache rehydration pass
#[derive(Debug, Clone, Default)]
pub struct RehydrationStats {
    pub restored: usize,
    pub skipped: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RehydrationStats {
    pub fn duration_seconds(&self) -> Option<f64> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            Some((end - start).num_milliseconds() as f64 / 1000.0)
        } else {
            None
        }
    }
}

/// Fill `cache` with every order the store can load.
///
/// Runs once at startup, before any message is consumed. Orders the store
/// could not read completely are skipped and logged; failing to read the
/// order set at all is returned as an error and the cache is left as it was.
pub async fn rehydrate(
    store: &dyn OrderStore,
    cache: &OrderCache,
) -> Result<RehydrationStats, ReadModelError> {
    info!("Starting cache rehydration");

    let mut stats = RehydrationStats {
        start_time: Some(Utc::now()),
        ..Default::default()
    };

    let loaded = store.load_all().await?;

    for skipped in &loaded.skipped {
        warn!(
            order_uid = %skipped.order_uid,
            reason = %skipped.reason,
            "Order left out of cache rehydration"
        );
    }
    stats.skipped = loaded.skipped.len();

    for order in loaded.orders {
        cache.put(order).await;
        stats.restored += 1;
    }

    stats.end_time = Some(Utc::now());
    record_rehydration(stats.restored, stats.skipped);

    info!(
        restored = stats.restored,
        skipped = stats.skipped,
        duration_seconds = ?stats.duration_seconds(),
        "Cache rehydration completed"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Item, Order};
    use order_store::InMemoryOrderStore;
    use tokio_test::assert_err;

    fn order(uid: &str, chrt_ids: &[i64]) -> Order {
        Order {
            order_uid: uid.to_string(),
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
    async fn test_rehydrate_restores_every_stored_order() {
        let store = InMemoryOrderStore::new();
        let a1 = store.persist(order("A1", &[1, 2])).await.unwrap();
        store.persist(order("B2", &[3])).await.unwrap();

        let cache = OrderCache::new();
        let stats = rehydrate(&store, &cache).await.unwrap();

        assert_eq!(stats.restored, 2);
        assert_eq!(stats.skipped, 0);
        assert!(stats.duration_seconds().is_some());
        assert_eq!(cache.len().await, 2);
        assert_eq!(*cache.get("A1").await.unwrap(), a1);
    }

    #[tokio::test]
    async fn test_rehydrate_empty_store() {
        let store = InMemoryOrderStore::new();
        let cache = OrderCache::new();

        let stats = rehydrate(&store, &cache).await.unwrap();

        assert_eq!(stats.restored, 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_rehydrate_skips_orders_with_unreadable_items() {
        let store = InMemoryOrderStore::new();
        store.persist(order("A1", &[1])).await.unwrap();
        store.persist(order("B2", &[2])).await.unwrap();
        store.fail_items_for("A1");

        let cache = OrderCache::new();
        let stats = rehydrate(&store, &cache).await.unwrap();

        assert_eq!(stats.restored, 1);
        assert_eq!(stats.skipped, 1);
        assert!(cache.get("A1").await.is_none());
        assert!(cache.get("B2").await.is_some());
    }

    #[tokio::test]
    async fn test_rehydrate_fails_when_store_unreadable() {
        let store = InMemoryOrderStore::new();
        store.persist(order("A1", &[1])).await.unwrap();
        store.set_unavailable(true);

        let cache = OrderCache::new();
        let err = assert_err!(rehydrate(&store, &cache).await);

        assert!(matches!(err, ReadModelError::RehydrationFailed(_)));
        assert!(cache.is_empty().await);
    }
}
