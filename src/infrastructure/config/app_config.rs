//! Service configuration, read once at start and injected into the
//! components that need it. Nothing reads the environment after boot.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default JPEG encoder quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;
/// Default WebP encoder quality.
pub const DEFAULT_WEBP_QUALITY: u8 = 80;
/// Flat directory holding both origin and derived cache entries.
pub const CACHE_PATH: &str = "/tmp/hyperproxy";
/// Sweep trigger: total cache bytes above this start an eviction pass.
pub const MAX_CACHE_SIZE: u64 = 1024 * 1024 * 1024;
/// Memory ceiling handed to the transform back end at boot.
pub const TRANSFORM_MEMORY_LIMIT: u64 = 512 * 1024 * 1024;
/// Total deadline for one origin fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// User-Agent sent to origins.
pub const USER_AGENT: &str = "hyperproxy bot";

/// Runtime configuration of the proxy.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen port.
    pub port: u16,
    /// JPEG encoder quality, 1-100.
    pub jpeg_quality: u8,
    /// WebP encoder quality, 1-100.
    pub webp_quality: u8,
    /// Cache directory.
    pub cache_path: PathBuf,
    /// Cache size ceiling in bytes.
    pub max_cache_size: u64,
    /// Transform back-end memory ceiling in bytes.
    pub transform_memory_limit: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            webp_quality: DEFAULT_WEBP_QUALITY,
            cache_path: PathBuf::from(CACHE_PATH),
            max_cache_size: MAX_CACHE_SIZE,
            transform_memory_limit: TRANSFORM_MEMORY_LIMIT,
        }
    }
}

impl AppConfig {
    /// Builds the configuration from `PORT`, `JPEG_QUALITY` and
    /// `WEBP_QUALITY`. Unset variables use defaults; unparsable values are
    /// logged and use defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("PORT", DEFAULT_PORT),
            jpeg_quality: env_quality("JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            webp_quality: env_quality("WEBP_QUALITY", DEFAULT_WEBP_QUALITY),
            ..Self::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "ignoring unparsable environment variable");
            default
        }),
        Err(_) => default,
    }
}

fn env_quality(name: &str, default: u8) -> u8 {
    let value: u8 = env_parsed(name, default);
    value.clamp(1, 100)
}
