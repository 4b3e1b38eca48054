use async_trait::async_trait;
use common::metrics::record_message;
use ingestion::OrderPipeline;
use messaging::{ConsumerError, OrderConsumer, ReceivedMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Something the ingest loop can pull order messages from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn recv(&self) -> Result<ReceivedMessage, ConsumerError>;
}

#[async_trait]
impl MessageSource for OrderConsumer {
    async fn recv(&self) -> Result<ReceivedMessage, ConsumerError> {
        OrderConsumer::recv(self).await
    }
}

/// Receive messages and hand each one to the pipeline on its own task.
///
/// At most `max_in_flight` messages are processed at once. Returns once
/// `shutdown` fires and every in-flight message has finished.
pub async fn run_ingest_loop<S: MessageSource>(
    source: S,
    pipeline: Arc<OrderPipeline>,
    max_in_flight: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let max_in_flight = max_in_flight.max(1);
    let permits = Arc::new(Semaphore::new(max_in_flight));

    info!(max_in_flight, "Starting order consumption loop...");

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = source.recv() => received,
        };

        match received {
            Ok(message) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let outcome = pipeline.handle(&message.payload).await;
                    debug!(
                        key = ?message.key,
                        partition = message.partition,
                        offset = message.offset,
                        outcome = outcome.as_str(),
                        "Message processed"
                    );
                    drop(permit);
                });
            }
            Err(ConsumerError::NoPayload { topic, partition, offset }) => {
                warn!(topic = %topic, partition, offset, "Skipping message without payload");
                record_message("rejected", 0.0);
            }
            Err(e) => {
                error!("Error receiving from Kafka: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    info!("Consumption stopped, waiting for in-flight messages...");
    // Every task holds one permit until it finishes.
    let _ = permits.acquire_many(max_in_flight as u32).await;
    info!("Order consumption loop stopped");
}
