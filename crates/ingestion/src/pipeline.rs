use chrono::Utc;
use common::metrics::record_message;
use domain::{DateCreatedPolicy, DomainError, Order, OrderMessage};
use order_store::{OrderStore, StoreError};
use read_model::OrderCache;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid order payload: {0}")]
    Validation(#[from] DomainError),

    #[error("Failed to persist order {order_uid}: {source}")]
    Storage {
        order_uid: String,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    /// True when the message itself is bad, as opposed to the store failing.
    pub fn is_validation(&self) -> bool {
        match self {
            IngestError::Validation(_) => true,
            IngestError::Storage { source, .. } => source.is_validation(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { order_uid: String, items: usize },
    Rejected { reason: String },
    Failed { order_uid: String, reason: String },
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Stored { .. } => "stored",
            IngestOutcome::Rejected { .. } => "rejected",
            IngestOutcome::Failed { .. } => "failed",
        }
    }
}

/// Turns order messages into durable rows and cache entries.
///
/// Each message is decoded, persisted, and only then installed in the cache,
/// so the cache never holds an order the store does not. A message that fails
/// at any step is dropped: neither the store nor the cache changes.
pub struct OrderPipeline {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    date_policy: DateCreatedPolicy,
}

impl OrderPipeline {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self {
            store,
            cache,
            date_policy: DateCreatedPolicy::default(),
        }
    }

    pub fn with_date_policy(mut self, date_policy: DateCreatedPolicy) -> Self {
        self.date_policy = date_policy;
        self
    }

    /// Decode, persist, then cache one payload.
    pub async fn ingest(&self, payload: &[u8]) -> Result<Arc<Order>, IngestError> {
        let message = OrderMessage::from_slice(payload)?;

        if message.parse_date_created().is_none()
            && self.date_policy == DateCreatedPolicy::ProcessingTime
        {
            warn!(
                order_uid = %message.order_uid,
                date_created = %message.date_created,
                "date_created is not RFC-3339, using processing time"
            );
        }

        let order = message.into_order_with_policy(Utc::now(), self.date_policy)?;
        let order_uid = order.order_uid.clone();

        let stored = self
            .store
            .persist(order)
            .await
            .map_err(|source| IngestError::Storage {
                order_uid: order_uid.clone(),
                source,
            })?;

        Ok(self.cache.put(stored).await)
    }

    /// Ingest one payload and report the outcome. Never fails: errors are
    /// logged and the message is discarded.
    pub async fn handle(&self, payload: &[u8]) -> IngestOutcome {
        let started = Instant::now();

        let outcome = match self.ingest(payload).await {
            Ok(order) => {
                info!(
                    order_uid = %order.order_uid,
                    items = order.items.len(),
                    "Order ingested"
                );
                IngestOutcome::Stored {
                    order_uid: order.order_uid.clone(),
                    items: order.items.len(),
                }
            }
            Err(IngestError::Storage { order_uid, source }) if !source.is_validation() => {
                error!(order_uid = %order_uid, error = %source, "Failed to persist order, message discarded");
                IngestOutcome::Failed {
                    order_uid,
                    reason: source.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Rejected order message");
                IngestOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        };

        record_message(outcome.as_str(), started.elapsed().as_secs_f64());
        debug!(outcome = outcome.as_str(), "Message handled");
        outcome
    }
}
