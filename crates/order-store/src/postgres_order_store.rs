use super::{check_item, check_order, LoadedOrders, OrderStore, SkippedOrder, StoreError};
use async_trait::async_trait;
use common::metrics;
use domain::{Item, Order};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const UPSERT_ORDER: &str = r#"
    INSERT INTO orders (
        order_uid, track_number, entry,
        delivery_name, delivery_phone, delivery_zip, delivery_city,
        delivery_address, delivery_region, delivery_email,
        payment_transaction, payment_request_id, payment_currency,
        payment_provider, payment_amount, payment_dt, payment_bank,
        delivery_cost, goods_total, custom_fee,
        locale, internal_signature, customer_id, delivery_service,
        shardkey, sm_id, date_created, oof_shard
    )
    VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
        $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28
    )
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        delivery_name = EXCLUDED.delivery_name,
        delivery_phone = EXCLUDED.delivery_phone,
        delivery_zip = EXCLUDED.delivery_zip,
        delivery_city = EXCLUDED.delivery_city,
        delivery_address = EXCLUDED.delivery_address,
        delivery_region = EXCLUDED.delivery_region,
        delivery_email = EXCLUDED.delivery_email,
        payment_transaction = EXCLUDED.payment_transaction,
        payment_request_id = EXCLUDED.payment_request_id,
        payment_currency = EXCLUDED.payment_currency,
        payment_provider = EXCLUDED.payment_provider,
        payment_amount = EXCLUDED.payment_amount,
        payment_dt = EXCLUDED.payment_dt,
        payment_bank = EXCLUDED.payment_bank,
        delivery_cost = EXCLUDED.delivery_cost,
        goods_total = EXCLUDED.goods_total,
        custom_fee = EXCLUDED.custom_fee,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        customer_id = EXCLUDED.customer_id,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard,
        updated_at = NOW()
    RETURNING id, payment_dt, date_created, created_at, updated_at
"#;

const INSERT_ITEM: &str = r#"
    INSERT INTO order_items (
        order_uid, chrt_id, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING id, created_at
"#;

const SELECT_ORDERS: &str = r#"
    SELECT
        id, order_uid, track_number, entry,
        delivery_name, delivery_phone, delivery_zip, delivery_city,
        delivery_address, delivery_region, delivery_email,
        payment_transaction, payment_request_id, payment_currency,
        payment_provider, payment_amount, payment_dt, payment_bank,
        delivery_cost, goods_total, custom_fee,
        locale, internal_signature, customer_id, delivery_service,
        shardkey, sm_id, date_created, oof_shard,
        created_at, updated_at
    FROM orders
    ORDER BY id ASC
"#;

const SELECT_ITEMS: &str = r#"
    SELECT
        id, order_uid, chrt_id, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status, created_at
    FROM order_items
    WHERE order_uid = $1
    ORDER BY id ASC
"#;

/// PostgreSQL implementation of the order store
pub struct PostgresOrderStore {
    pool: PgPool,
    tx_timeout: Duration,
}

impl PostgresOrderStore {
    /// Create a store with the default 5 second transaction timeout
    pub fn new(pool: PgPool) -> Self {
        Self::with_tx_timeout(pool, Duration::from_secs(5))
    }

    pub fn with_tx_timeout(pool: PgPool, tx_timeout: Duration) -> Self {
        Self { pool, tx_timeout }
    }

    async fn persist_in_tx(&self, mut order: Order) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Server-side bound; the client-side timer in `persist` covers the rest.
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.tx_timeout.as_millis().max(1)
        ))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(UPSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.delivery_name)
            .bind(&order.delivery_phone)
            .bind(&order.delivery_zip)
            .bind(&order.delivery_city)
            .bind(&order.delivery_address)
            .bind(&order.delivery_region)
            .bind(&order.delivery_email)
            .bind(&order.payment_transaction)
            .bind(&order.payment_request_id)
            .bind(&order.payment_currency)
            .bind(&order.payment_provider)
            .bind(order.payment_amount)
            .bind(order.payment_dt)
            .bind(&order.payment_bank)
            .bind(order.delivery_cost)
            .bind(order.goods_total)
            .bind(order.custom_fee)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .fetch_one(&mut *tx)
            .await?;

        // TIMESTAMPTZ keeps microseconds; take back what was actually stored.
        order.id = Some(row.try_get("id")?);
        order.payment_dt = row.try_get("payment_dt")?;
        order.date_created = row.try_get("date_created")?;
        order.created_at = Some(row.try_get("created_at")?);
        order.updated_at = Some(row.try_get("updated_at")?);

        let removed = sqlx::query("DELETE FROM order_items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let items = std::mem::take(&mut order.items);
        let mut stored_items = Vec::with_capacity(items.len());

        for mut item in items {
            // Returning early drops `tx`, which rolls the upsert and delete back.
            check_item(&order.order_uid, &item)?;

            let row = sqlx::query(INSERT_ITEM)
                .bind(&item.order_uid)
                .bind(item.chrt_id)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .fetch_one(&mut *tx)
                .await?;

            item.id = Some(row.try_get("id")?);
            item.created_at = Some(row.try_get("created_at")?);
            stored_items.push(item);
        }

        tx.commit().await?;

        debug!(
            order_uid = %order.order_uid,
            removed_items = removed,
            inserted_items = stored_items.len(),
            "Order transaction committed"
        );

        order.items = stored_items;
        Ok(order)
    }

    async fn load_items(&self, order_uid: &str) -> Result<Vec<Item>, sqlx::Error> {
        let rows = sqlx::query(SELECT_ITEMS)
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn persist(&self, order: Order) -> Result<Order, StoreError> {
        check_order(&order)?;

        let start = Instant::now();
        let order_uid = order.order_uid.clone();

        // A timed-out future drops its open transaction, which rolls it back.
        let result = match tokio::time::timeout(self.tx_timeout, self.persist_in_tx(order)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.tx_timeout)),
        };

        metrics::record_store_operation("persist", result.is_ok(), start.elapsed().as_secs_f64());

        match &result {
            Ok(stored) => info!(
                order_uid = %order_uid,
                items = stored.items.len(),
                "Order persisted"
            ),
            Err(e) => error!(order_uid = %order_uid, error = %e, "Order persist rolled back"),
        }

        result
    }

    async fn load_all(&self) -> Result<LoadedOrders, StoreError> {
        let start = Instant::now();

        let rows = match sqlx::query(SELECT_ORDERS).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                metrics::record_store_operation("load_all", false, start.elapsed().as_secs_f64());
                error!(error = %e, "Failed to read orders");
                return Err(e.into());
            }
        };

        let mut loaded = LoadedOrders::default();

        for row in &rows {
            let mut order = match order_from_row(row) {
                Ok(order) => order,
                Err(e) => {
                    let order_uid: String = row.try_get("order_uid").unwrap_or_default();
                    warn!(order_uid = %order_uid, error = %e, "Skipping unreadable order row");
                    loaded.skipped.push(SkippedOrder {
                        order_uid,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.load_items(&order.order_uid).await {
                Ok(items) => order.items = items,
                Err(e) => {
                    warn!(order_uid = %order.order_uid, error = %e, "Skipping order whose items could not be read");
                    loaded.skipped.push(SkippedOrder {
                        order_uid: order.order_uid,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            loaded.orders.push(order);
        }

        metrics::record_store_operation("load_all", true, start.elapsed().as_secs_f64());
        debug!(
            orders = loaded.orders.len(),
            skipped = loaded.skipped.len(),
            "Loaded orders from store"
        );

        Ok(loaded)
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        id: Some(row.try_get("id")?),
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery_name: row.try_get("delivery_name")?,
        delivery_phone: row.try_get("delivery_phone")?,
        delivery_zip: row.try_get("delivery_zip")?,
        delivery_city: row.try_get("delivery_city")?,
        delivery_address: row.try_get("delivery_address")?,
        delivery_region: row.try_get("delivery_region")?,
        delivery_email: row.try_get("delivery_email")?,
        payment_transaction: row.try_get("payment_transaction")?,
        payment_request_id: row.try_get("payment_request_id")?,
        payment_currency: row.try_get("payment_currency")?,
        payment_provider: row.try_get("payment_provider")?,
        payment_amount: row.try_get("payment_amount")?,
        payment_dt: row.try_get("payment_dt")?,
        payment_bank: row.try_get("payment_bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        created_at: Some(row.try_get("created_at")?),
        updated_at: Some(row.try_get("updated_at")?),
        items: Vec::new(),
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        id: Some(row.try_get("id")?),
        order_uid: row.try_get("order_uid")?,
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
        created_at: Some(row.try_get("created_at")?),
    })
}
