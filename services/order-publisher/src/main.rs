use anyhow::{bail, Context, Result};
use common::telemetry::init_basic_telemetry;
use common::AppConfig;
use messaging::OrderPublisher;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_INPUT: &str = "model.json";

/// A payload ready to go on the order topic.
#[derive(Debug)]
struct PreparedOrder {
    key: Option<String>,
    payload: Vec<u8>,
}

/// Check that `raw` is a JSON object and pick its partition key.
///
/// The bytes are published unchanged; field validation is the consumer's job.
fn prepare(raw: Vec<u8>) -> Result<PreparedOrder> {
    let value: Value = serde_json::from_slice(&raw).context("input is not valid JSON")?;
    let Some(object) = value.as_object() else {
        bail!("input must be a JSON object, got {}", kind(&value));
    };

    let key = object
        .get("order_uid")
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string);

    Ok(PreparedOrder { key, payload: raw })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn input_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT))
}

async fn publish_file(path: &Path, config: &AppConfig) -> Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let order = prepare(raw).with_context(|| format!("rejected {}", path.display()))?;

    if order.key.is_none() {
        tracing::warn!("Input has no order_uid, publishing without a key");
    }

    let publisher = OrderPublisher::new(&config.kafka.brokers, config.kafka.topic.clone())?;
    publisher
        .publish_raw(order.key.as_deref(), &order.payload)
        .await?;

    info!(
        order_uid = ?order.key,
        topic = %publisher.topic(),
        bytes = order.payload.len(),
        "Order published"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = AppConfig::from_env();
    init_basic_telemetry("order-publisher", &config.log_level);

    let path = input_path();
    info!("Publishing {} to topic '{}'", path.display(), config.kafka.topic);

    publish_file(&path, &config).await.map_err(|e| {
        tracing::error!("Publish failed: {:#}", e);
        e
    })
}
