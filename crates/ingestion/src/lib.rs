pub mod pipeline;

pub use pipeline::{IngestError, IngestOutcome, OrderPipeline};
