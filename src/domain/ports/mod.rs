//! Port definitions.

mod metrics_port;
mod transform_port;

pub use metrics_port::CacheSizeObserver;
pub use transform_port::{TransformBackend, TransformJob};
