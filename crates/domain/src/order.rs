use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical order record as stored in `orders` and held in the read cache.
///
/// `id`, `created_at` and `updated_at` are owned by the store and stay `None`
/// until the order has been persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,

    pub delivery_name: String,
    pub delivery_phone: String,
    pub delivery_zip: String,
    pub delivery_city: String,
    pub delivery_address: String,
    pub delivery_region: String,
    pub delivery_email: String,

    pub payment_transaction: String,
    pub payment_request_id: String,
    pub payment_currency: String,
    pub payment_provider: String,
    pub payment_amount: i32,
    pub payment_dt: DateTime<Utc>,
    pub payment_bank: String,
    pub delivery_cost: i32,
    pub goods_total: i32,
    pub custom_fee: i32,

    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    pub items: Vec<Item>,
}

/// Line item of an [`Order`]. Only ever reached through its parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<i64>,
    pub order_uid: String,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i32,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i32,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// True once the store has assigned a row id.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Compares business content only, ignoring store bookkeeping
    /// (row ids and timestamps on the order and its items).
    pub fn same_content(&self, other: &Order) -> bool {
        self.without_bookkeeping() == other.without_bookkeeping()
    }

    fn without_bookkeeping(&self) -> Order {
        let mut order = self.clone();
        order.id = None;
        order.created_at = None;
        order.updated_at = None;
        for item in &mut order.items {
            item.id = None;
            item.created_at = None;
        }
        order
    }
}
