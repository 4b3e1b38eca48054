use sqlx::PgPool;
use tracing::info;

/// Idempotent bootstrap DDL for the `orders` and `order_items` tables.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id                  BIGSERIAL PRIMARY KEY,
        order_uid           TEXT NOT NULL UNIQUE CHECK (order_uid <> ''),
        track_number        TEXT NOT NULL DEFAULT '',
        entry               TEXT NOT NULL DEFAULT '',
        delivery_name       TEXT NOT NULL DEFAULT '',
        delivery_phone      TEXT NOT NULL DEFAULT '',
        delivery_zip        TEXT NOT NULL DEFAULT '',
        delivery_city       TEXT NOT NULL DEFAULT '',
        delivery_address    TEXT NOT NULL DEFAULT '',
        delivery_region     TEXT NOT NULL DEFAULT '',
        delivery_email      TEXT NOT NULL DEFAULT '',
        payment_transaction TEXT NOT NULL DEFAULT '',
        payment_request_id  TEXT NOT NULL DEFAULT '',
        payment_currency    TEXT NOT NULL DEFAULT '',
        payment_provider    TEXT NOT NULL DEFAULT '',
        payment_amount      INTEGER NOT NULL DEFAULT 0,
        payment_dt          TIMESTAMPTZ NOT NULL,
        payment_bank        TEXT NOT NULL DEFAULT '',
        delivery_cost       INTEGER NOT NULL DEFAULT 0,
        goods_total         INTEGER NOT NULL DEFAULT 0,
        custom_fee          INTEGER NOT NULL DEFAULT 0,
        locale              TEXT NOT NULL DEFAULT '',
        internal_signature  TEXT NOT NULL DEFAULT '',
        customer_id         TEXT NOT NULL DEFAULT '',
        delivery_service    TEXT NOT NULL DEFAULT '',
        shardkey            TEXT NOT NULL DEFAULT '',
        sm_id               INTEGER NOT NULL DEFAULT 0,
        date_created        TIMESTAMPTZ NOT NULL,
        oof_shard           TEXT NOT NULL DEFAULT '',
        created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id           BIGSERIAL PRIMARY KEY,
        order_uid    TEXT NOT NULL REFERENCES orders(order_uid) ON DELETE CASCADE,
        chrt_id      BIGINT NOT NULL DEFAULT 0,
        track_number TEXT NOT NULL DEFAULT '',
        price        INTEGER NOT NULL DEFAULT 0,
        rid          TEXT NOT NULL DEFAULT '',
        name         TEXT NOT NULL DEFAULT '',
        sale         INTEGER NOT NULL DEFAULT 0,
        size         TEXT NOT NULL DEFAULT '',
        total_price  INTEGER NOT NULL DEFAULT 0,
        nm_id        BIGINT NOT NULL DEFAULT 0,
        brand        TEXT NOT NULL DEFAULT '',
        status       INTEGER NOT NULL DEFAULT 0,
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_order_items_order_uid ON order_items (order_uid)",
];

/// Create the tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Order store schema is in place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_reference_orders() {
        let items = SCHEMA_STATEMENTS[1];
        assert!(items.contains("REFERENCES orders(order_uid)"));
        assert!(SCHEMA_STATEMENTS.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
