use anyhow::Result;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use common::AppConfig;
use futures_util::stream::StreamExt;
use ingestion::OrderPipeline;
use messaging::OrderConsumer;
use order_store::schema::ensure_schema;
use order_store::{OrderStore, PostgresOrderStore};
use read_model::{rehydrate, OrderCache};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

mod handlers;
mod ingest_loop;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let telemetry_config = TelemetryConfig::from_env("order-service");
    let enable_jaeger = telemetry_config.enable_jaeger;
    init_telemetry(telemetry_config)?;

    info!("Starting Order Service...");
    info!("Distributed tracing: {}", if enable_jaeger { "enabled" } else { "disabled" });

    let config = AppConfig::from_env();

    info!("Configuration:");
    info!("  Database: {}:{}/{}", config.database.host, config.database.port, config.database.database);
    info!("  Kafka Brokers: {}", config.kafka.brokers);
    info!("  Kafka Topic: {}", config.kafka.topic);
    info!("  Consumer Group: {}", config.kafka.group_id);
    info!("  Port: {}", config.http.port);
    info!("  Max in-flight messages: {}", config.pipeline.max_in_flight);
    info!("  date_created policy: {}", config.pipeline.date_created_policy);

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await?;
    info!("Database connected successfully");

    if config.database.init_schema {
        ensure_schema(&pool).await?;
        info!("Database schema ensured");
    }

    let store: Arc<dyn OrderStore> = Arc::new(PostgresOrderStore::with_tx_timeout(
        pool.clone(),
        config.database.tx_timeout,
    ));

    // The cache must be complete before anything reads from or writes to it.
    let cache = Arc::new(OrderCache::new());
    let stats = rehydrate(store.as_ref(), &cache).await?;
    info!(
        restored = stats.restored,
        skipped = stats.skipped,
        "Cache ready"
    );

    let pipeline = Arc::new(
        OrderPipeline::new(store, cache.clone())
            .with_date_policy(config.pipeline.date_created_policy),
    );

    // Create Kafka consumer
    info!("Creating Kafka consumer...");
    let consumer = OrderConsumer::new(
        &config.kafka.brokers,
        &config.kafka.group_id,
        &[config.kafka.topic.as_str()],
    )?;

    // Setup signal handling
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = Signals::new([SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();

    let signal_task = tokio::spawn(async move {
        let mut signals = signals;
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping...");
                    let _ = shutdown_tx.send(true);
                    break;
                }
                _ => {}
            }
        }
    });

    let ingest_task = tokio::spawn(ingest_loop::run_ingest_loop(
        consumer,
        pipeline,
        config.pipeline.max_in_flight,
        shutdown_rx.clone(),
    ));

    // Build router
    let app = routes::create_router(AppState::new(cache));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut http_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.changed().await;
        })
        .await
        .map_err(|e| {
            tracing::error!("Server error: {}", e);
            e
        })?;

    // Cleanup
    info!("Shutting down order service...");
    ingest_task.await?;
    signals_handle.close();
    let _ = signal_task.await;
    pool.close().await;
    info!("Order service stopped");

    // Shutdown telemetry gracefully
    shutdown_telemetry();

    Ok(())
}
