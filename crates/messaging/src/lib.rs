pub mod consumer;
pub mod producer;

pub use consumer::{ConsumerError, OrderConsumer, ReceivedMessage};
pub use producer::{OrderPublisher, PublisherError};
