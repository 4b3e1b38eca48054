use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Message at {topic}/{partition}@{offset} has no payload")]
    NoPayload {
        topic: String,
        partition: i32,
        offset: i64,
    },
}

/// A message taken off the order topic, detached from the consumer.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Kafka consumer for the order topic.
///
/// Offsets are auto-committed on receipt: a message that fails to ingest is
/// dropped, never redelivered.
pub struct OrderConsumer {
    consumer: StreamConsumer,
}

impl OrderConsumer {
    /// Create a new Kafka consumer
    pub fn new(brokers: &str, group_id: &str, topics: &[&str]) -> Result<Self, ConsumerError> {
        info!(
            "Creating Kafka consumer with group_id: {}, topics: {:?}",
            group_id, topics
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", group_id)
            .set("bootstrap.servers", brokers)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .create()?;

        consumer.subscribe(topics)?;

        info!("Kafka consumer created successfully");
        Ok(Self { consumer })
    }

    /// Wait for the next message.
    pub async fn recv(&self) -> Result<ReceivedMessage, ConsumerError> {
        let message = self.consumer.recv().await?;

        debug!(
            "Received message from topic: {}, partition: {}, offset: {}",
            message.topic(),
            message.partition(),
            message.offset()
        );

        let payload = match message.payload() {
            Some(payload) => payload.to_vec(),
            None => {
                warn!("Message has no payload");
                return Err(ConsumerError::NoPayload {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                });
            }
        };

        let key = message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned());

        Ok(ReceivedMessage {
            key,
            payload,
            partition: message.partition(),
            offset: message.offset(),
        })
    }
}
