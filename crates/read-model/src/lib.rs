pub mod cache;
pub mod rehydrate;

pub use cache::OrderCache;
pub use rehydrate::{rehydrate, RehydrationStats};

use order_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("Failed to load orders for cache rehydration: {0}")]
    RehydrationFailed(#[from] StoreError),
}
