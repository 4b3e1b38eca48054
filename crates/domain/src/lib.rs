//! Record model for ingested orders.
//!
//! [`OrderMessage`] is the payload as it arrives on the stream (nested
//! delivery/payment groups, epoch payment time, textual creation date).
//! [`Order`] is the canonical flat-with-children shape shared by the store
//! and the read cache.

pub mod errors;
pub mod message;
pub mod order;

pub use errors::DomainError;
pub use message::{DateCreatedPolicy, DeliveryMessage, ItemMessage, OrderMessage, PaymentMessage};
pub use order::{Item, Order};
