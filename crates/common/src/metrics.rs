use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, Histogram, HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Ingestion metrics
    pub static ref MESSAGE_COUNTER: CounterVec = register_counter_vec!(
        "orders_messages_total",
        "Total number of stream messages handled, by outcome",
        &["outcome"]
    )
    .expect("metric cannot be created");

    pub static ref INGEST_DURATION: Histogram = register_histogram!(
        "orders_ingest_duration_seconds",
        "End-to-end handling time of a single message in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric cannot be created");

    // Store metrics
    pub static ref STORE_OPERATIONS: CounterVec = register_counter_vec!(
        "orders_store_operations_total",
        "Total number of order store operations",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "orders_store_duration_seconds",
        "Order store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
    )
    .expect("metric cannot be created");

    // Cache metrics
    pub static ref CACHE_REQUESTS: CounterVec = register_counter_vec!(
        "orders_cache_requests_total",
        "Total number of read cache requests",
        &["operation", "status"]
    )
    .expect("metric cannot be created");

    pub static ref CACHE_ENTRIES: IntGauge = register_int_gauge!(
        "orders_cache_entries",
        "Number of orders currently held in the read cache"
    )
    .expect("metric cannot be created");

    // Rehydration metrics
    pub static ref REHYDRATED_COUNTER: CounterVec = register_counter_vec!(
        "orders_rehydrated_total",
        "Orders restored into the cache at startup, by status",
        &["status"]
    )
    .expect("metric cannot be created");
}

/// Get all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Helper function to record the outcome of one stream message
pub fn record_message(outcome: &str, duration_secs: f64) {
    MESSAGE_COUNTER.with_label_values(&[outcome]).inc();
    INGEST_DURATION.observe(duration_secs);
}

/// Helper function to record order store operation
pub fn record_store_operation(operation: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "error" };
    STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
    STORE_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Helper function to record cache hit/miss
pub fn record_cache_request(operation: &str, hit: bool) {
    let status = if hit { "hit" } else { "miss" };
    CACHE_REQUESTS
        .with_label_values(&[operation, status])
        .inc();
}

pub fn set_cache_entries(entries: usize) {
    CACHE_ENTRIES.set(entries as i64);
}

/// Helper function to record rehydration totals
pub fn record_rehydration(restored: usize, skipped: usize) {
    REHYDRATED_COUNTER
        .with_label_values(&["restored"])
        .inc_by(restored as f64);
    REHYDRATED_COUNTER
        .with_label_values(&["skipped"])
        .inc_by(skipped as f64);
}
