//! Background eviction task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::ports::CacheSizeObserver;

use super::DiskCache;

/// Time between eviction passes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Spawns the single sweeper task: one sweep at boot, then one every
/// [`SWEEP_INTERVAL`]. Runs never overlap; each pass executes on the
/// blocking pool and publishes the resulting total through `observer`.
pub fn spawn(cache: Arc<DiskCache>, observer: Arc<dyn CacheSizeObserver>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let swept = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || swept.sweep()).await {
                Ok(Ok(total)) => observer.record_cache_size(total),
                Ok(Err(e)) => warn!(error = %e, "cache sweep failed"),
                Err(e) => warn!(error = %e, "cache sweep task panicked"),
            }
        }
    })
}

/// Bundled observer: logs the post-sweep total. A metrics registry exposing
/// a gauge is wired behind [`CacheSizeObserver`] by the embedding service.
#[derive(Debug, Default)]
pub struct LoggingCacheSizeObserver;

impl CacheSizeObserver for LoggingCacheSizeObserver {
    fn record_cache_size(&self, bytes: u64) {
        info!(bytes, "cache size after sweep");
    }
}
