//! Disk cache and its eviction sweeper.

pub mod disk;
pub mod sweeper;

pub use disk::{write_atomic, DiskCache, OriginMeta};
pub use sweeper::LoggingCacheSizeObserver;
