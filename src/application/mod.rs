//! Application layer orchestrating the request flow.

/// Request pipeline.
pub mod pipeline;

pub use pipeline::{ImagePipeline, ProxyResponse};
