//! Infrastructure layer with adapters for the filesystem, the network, and
//! the image back end.

/// Disk cache and eviction sweeper.
pub mod cache;
/// Service configuration.
pub mod config;
/// SSRF guard and origin fetcher.
pub mod fetch;
/// Transform back end.
pub mod transform;

pub use cache::{DiskCache, LoggingCacheSizeObserver};
pub use config::AppConfig;
pub use fetch::{OriginFetcher, SsrfGuard};
pub use transform::ImageEngine;
