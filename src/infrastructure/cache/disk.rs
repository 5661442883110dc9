//! Disk-backed content-addressed cache.
//!
//! One flat directory holds two kinds of entries: origin entries (raw origin
//! bytes under `{key}`, content-type in a `{key}.meta` sidecar) and derived
//! entries (transformed bytes under `{key}.{ext}`). There is no in-memory
//! index; the filesystem is the index. The directory is shared mutable state
//! whose only discipline is the atomic-rename convention, so readers never
//! observe a truncated file. The sweeper, or an operator with `rm`, may
//! unlink anything at any time; callers treat a vanished file as a miss.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::entities::CacheKey;

/// Sweeps drive the total down to this fraction of the ceiling, giving the
/// trigger hysteresis: a near-full cache does not sweep continuously.
const LOW_WATER_FACTOR: f64 = 0.8;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sidecar metadata stored next to an origin entry.
///
/// Retaining the origin's content-type is what lets the bypass paths (SVG,
/// `0x0`, animated, failed transform) answer with the correct header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginMeta {
    /// `Content-Type` the origin served.
    pub content_type: String,
}

/// Size-bounded cache over a flat directory.
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    max_size: u64,
}

impl DiskCache {
    /// Creates a cache handle; no filesystem access happens here. The
    /// directory is created lazily by stores and by [`DiskCache::sweep`], so
    /// start-up never fails on a missing cache directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            max_size,
        }
    }

    /// The cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an origin entry.
    #[must_use]
    pub fn origin_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{key}.meta"))
    }

    /// Path of a derived entry.
    #[must_use]
    pub fn derived_path(&self, key: &CacheKey, extension: &str) -> PathBuf {
        self.root.join(format!("{key}.{extension}"))
    }

    /// Stat-only probe for a derived entry.
    pub async fn lookup_derived(&self, key: &CacheKey, extension: &str) -> Option<PathBuf> {
        let path = self.derived_path(key, extension);
        let meta = tokio::fs::metadata(&path).await.ok()?;
        meta.is_file().then_some(path)
    }

    /// Probes for an origin entry. Hits only when both the body and its
    /// sidecar exist and the sidecar parses; anything else is a miss and the
    /// caller re-enters the fetch path.
    pub async fn lookup_origin(&self, key: &CacheKey) -> Option<(PathBuf, OriginMeta)> {
        let path = self.origin_path(key);
        let stat = tokio::fs::metadata(&path).await.ok()?;
        if !stat.is_file() {
            return None;
        }
        let raw = tokio::fs::read(self.meta_path(key)).await.ok()?;
        let meta = serde_json::from_slice(&raw).ok()?;
        Some((path, meta))
    }

    /// Stores an origin entry: sidecar first, then the body, each written to
    /// a temporary file and renamed into place. Concurrent writers for the
    /// same key race benignly; one result survives byte-for-byte.
    ///
    /// # Errors
    /// Returns the underlying I/O error; the caller degrades to its
    /// in-memory buffer.
    pub async fn store_origin(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        content_type: &str,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;

        let meta = OriginMeta {
            content_type: content_type.to_string(),
        };
        let meta_json = serde_json::to_vec(&meta).map_err(std::io::Error::other)?;
        write_atomic_async(&self.meta_path(key), &meta_json).await?;

        let path = self.origin_path(key);
        write_atomic_async(&path, bytes).await?;
        debug!(key = %key, size = bytes.len(), "stored origin entry");
        Ok(path)
    }

    /// One eviction pass. Creates the directory when missing (returning 0 on
    /// a fresh one), sums regular files, and when the sum reaches the ceiling
    /// deletes oldest-first (by mtime) until below the low-water mark.
    /// Individual unlink failures are logged and skipped. Returns the final
    /// total.
    ///
    /// # Errors
    /// Only directory creation or enumeration can fail; a sweep that started
    /// never does.
    pub fn sweep(&self) -> std::io::Result<u64> {
        std::fs::create_dir_all(&self.root)?;

        let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let Ok(entry) = entry else { continue };
            let Ok(stat) = entry.metadata() else { continue };
            if !stat.is_file() {
                continue;
            }
            let mtime = stat.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            total += stat.len();
            files.push((entry.path(), stat.len(), mtime));
        }

        if total < self.max_size {
            return Ok(total);
        }

        files.sort_by_key(|(_, _, mtime)| *mtime);

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let low_water = (self.max_size as f64 * LOW_WATER_FACTOR) as u64;
        for (path, size, _) in files {
            if total < low_water {
                break;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), size, "evicted cache entry");
                    total = total.saturating_sub(size);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to evict cache entry"),
            }
        }

        Ok(total)
    }
}

/// Writes `bytes` to a unique temporary sibling of `path` and renames it into
/// place, so no partial file is ever visible under the final name.
///
/// # Errors
/// Returns the underlying I/O error; the temporary file is removed on
/// failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_sibling(path);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

async fn write_atomic_async(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = tmp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// A tmp name unique within the process so concurrent writers of the same
/// key never share a scratch file.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let serial = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{:x}-{serial:x}.tmp", std::process::id()));
    PathBuf::from(name)
}
