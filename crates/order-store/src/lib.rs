pub mod memory_store;
pub mod postgres_order_store;
pub mod schema;

pub use memory_store::InMemoryOrderStore;
pub use postgres_order_store::PostgresOrderStore;

use async_trait::async_trait;
use domain::{Item, Order};
use std::time::Duration;
use thiserror::Error;

/// Durable store for orders and their line items.
///
/// The store is the source of truth; the read cache is rebuilt from
/// [`OrderStore::load_all`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Upsert the order and replace all of its items in one transaction.
    ///
    /// Returns the order as stored, with row ids and bookkeeping timestamps
    /// filled in. On error nothing has been written.
    async fn persist(&self, order: Order) -> Result<Order, StoreError>;

    /// Load every order with its items attached.
    ///
    /// Only a failure to read the order set is an error. An order whose items
    /// cannot be read is left out and reported in [`LoadedOrders::skipped`].
    async fn load_all(&self) -> Result<LoadedOrders, StoreError>;
}

/// Result of [`OrderStore::load_all`].
#[derive(Debug, Clone, Default)]
pub struct LoadedOrders {
    pub orders: Vec<Order>,
    pub skipped: Vec<SkippedOrder>,
}

/// An order left out of a bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOrder {
    pub order_uid: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl StoreError {
    /// True when the rejected data, not the store, is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::ValidationError(_))
    }
}

/// Checks an item right before it is written under `order_uid`.
pub(crate) fn check_item(order_uid: &str, item: &Item) -> Result<(), StoreError> {
    if item.order_uid.is_empty() {
        return Err(StoreError::ValidationError(format!(
            "item {} of order {} has an empty order_uid",
            item.chrt_id, order_uid
        )));
    }
    if item.order_uid != order_uid {
        return Err(StoreError::ValidationError(format!(
            "item {} belongs to order {}, not {}",
            item.chrt_id, item.order_uid, order_uid
        )));
    }
    Ok(())
}

pub(crate) fn check_order(order: &Order) -> Result<(), StoreError> {
    if order.order_uid.is_empty() {
        return Err(StoreError::ValidationError(
            "order_uid must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_item_rejects_empty_order_uid() {
        let item = Item {
            chrt_id: 9934930,
            ..Default::default()
        };
        let err = check_item("b563feb7b2b84b6test", &item).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_check_item_rejects_foreign_order_uid() {
        let item = Item {
            order_uid: "other".to_string(),
            ..Default::default()
        };
        assert!(check_item("b563feb7b2b84b6test", &item).is_err());
    }

    #[test]
    fn test_check_item_accepts_matching_order_uid() {
        let item = Item {
            order_uid: "b563feb7b2b84b6test".to_string(),
            ..Default::default()
        };
        assert!(check_item("b563feb7b2b84b6test", &item).is_ok());
    }

    #[test]
    fn test_timeout_is_not_validation() {
        assert!(!StoreError::Timeout(Duration::from_secs(5)).is_validation());
    }
}
