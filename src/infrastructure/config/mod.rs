//! Service configuration.

mod app_config;

pub use app_config::{
    AppConfig, CACHE_PATH, DEFAULT_JPEG_QUALITY, DEFAULT_PORT, DEFAULT_WEBP_QUALITY,
    FETCH_TIMEOUT, MAX_CACHE_SIZE, TRANSFORM_MEMORY_LIMIT, USER_AGENT,
};
