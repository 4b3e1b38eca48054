use read_model::OrderCache;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OrderCache>,
}

impl AppState {
    pub fn new(cache: Arc<OrderCache>) -> Self {
        Self { cache }
    }
}
