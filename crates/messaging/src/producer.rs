use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to create Kafka producer: {0}")]
    ProducerCreation(String),

    #[error("Failed to publish order: {0}")]
    PublishFailed(String),
}

/// Kafka publisher for order payloads
pub struct OrderPublisher {
    producer: FutureProducer,
    topic: String,
}

impl OrderPublisher {
    /// Create a new OrderPublisher
    ///
    /// # Arguments
    /// * `brokers` - Comma-separated list of Kafka brokers (e.g., "localhost:9092")
    /// * `topic` - The topic to publish orders to
    ///
    /// # Example
    /// ```no_run
    /// use messaging::OrderPublisher;
    ///
    /// let publisher = OrderPublisher::new("localhost:9092", "orders".to_string())
    ///     .expect("Failed to create publisher");
    /// ```
    pub fn new(brokers: &str, topic: String) -> Result<Self, PublisherError> {
        info!("Creating Kafka producer for brokers: {}", brokers);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all") // Wait for all replicas to acknowledge
            .set("retries", "3")
            .create()
            .map_err(|e| PublisherError::ProducerCreation(e.to_string()))?;

        info!("Kafka producer created successfully for topic: {}", topic);

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish an already encoded payload
    ///
    /// # Arguments
    /// * `key` - The partition key; orders use their `order_uid` so every
    ///   version of one order lands on the same partition
    /// * `payload` - Raw message bytes
    pub async fn publish_raw(&self, key: Option<&str>, payload: &[u8]) -> Result<(), PublisherError> {
        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
        {
            Ok((partition, offset)) => {
                info!(
                    "Order published successfully to topic '{}', partition {}, offset {}",
                    self.topic, partition, offset
                );
                Ok(())
            }
            Err((err, _)) => {
                warn!("Failed to publish order: {}", err);
                Err(PublisherError::PublishFailed(err.to_string()))
            }
        }
    }
}
