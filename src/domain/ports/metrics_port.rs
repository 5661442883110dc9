//! Port definition for cache-size observation.

/// Receives the total cache size after every sweep.
///
/// The bundled implementation logs the value; a metrics registry wiring a
/// gauge behind this trait is an external concern.
pub trait CacheSizeObserver: Send + Sync {
    /// Records the total size in bytes of the cache directory.
    fn record_cache_size(&self, bytes: u64);
}
