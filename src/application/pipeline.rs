//! Request pipeline: parse, probe, validate, fetch, transform, respond.
//!
//! Per-request data is stack-scoped and the cache directory is the only
//! shared state, so any number of pipelines may run concurrently. There is
//! no single-flight gate: two concurrent requests for the same missing key
//! may both fetch, and the cache's rename discipline lets one result survive
//! byte-for-byte.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheKey, ImageRequest, OutputFormat};
use crate::domain::errors::{ProxyError, TransformError};
use crate::domain::ports::{TransformBackend, TransformJob};
use crate::infrastructure::cache::DiskCache;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetch::{OriginFetcher, SsrfGuard};

/// A finished response: materialized bytes plus their content-type. The
/// presentation layer adds status and caching headers.
#[derive(Debug)]
pub struct ProxyResponse {
    /// Response body.
    pub bytes: Bytes,
    /// `Content-Type` to serve.
    pub content_type: String,
}

/// An origin image available for bypass or transform. `path` is `None` when
/// persisting the entry failed and the request degrades to the buffer.
struct LoadedOrigin {
    bytes: Bytes,
    content_type: String,
    path: Option<PathBuf>,
}

/// Orchestrates one `/image/` request end to end.
pub struct ImagePipeline {
    cache: Arc<DiskCache>,
    guard: SsrfGuard,
    fetcher: OriginFetcher,
    backend: Arc<dyn TransformBackend>,
    jpeg_quality: u8,
    webp_quality: u8,
}

impl ImagePipeline {
    /// Assembles the pipeline from its collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<DiskCache>,
        guard: SsrfGuard,
        fetcher: OriginFetcher,
        backend: Arc<dyn TransformBackend>,
        config: &AppConfig,
    ) -> Self {
        Self {
            cache,
            guard,
            fetcher,
            backend,
            jpeg_quality: config.jpeg_quality,
            webp_quality: config.webp_quality,
        }
    }

    /// Handles one request, identified by its full original request URI.
    ///
    /// # Errors
    /// [`ProxyError`] variants the presentation layer maps to status codes.
    /// Transform failures never surface here; they degrade to the origin
    /// bytes.
    pub async fn handle(&self, request_uri: &str) -> Result<ProxyResponse, ProxyError> {
        let subpath = request_uri
            .strip_prefix("/image/")
            .ok_or_else(|| ProxyError::bad_input("missing /image/ prefix"))?;
        let request = ImageRequest::parse(subpath)?;

        let request_key = CacheKey::from_input(request_uri);
        let extension = request.format().extension();

        // Derived probe comes before validation: an identical URI already
        // answered short-circuits to a file send.
        if let Some(path) = self.cache.lookup_derived(&request_key, extension).await {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!(url = request.remote_url(), "derived cache hit");
                    return Ok(ProxyResponse {
                        bytes: bytes.into(),
                        content_type: request.format().content_type().to_string(),
                    });
                }
                // Swept between lookup and open; treat as a miss.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.guard.validate(request.remote_url()).await?;

        let origin_key = CacheKey::from_input(request.remote_url());
        let origin = self.load_origin(&origin_key, request.remote_url()).await?;

        // Bypass: nothing to transform, or a vector source.
        if request.is_svg() || request.is_passthrough() {
            return Ok(ProxyResponse {
                bytes: origin.bytes,
                content_type: origin.content_type,
            });
        }

        let Some(origin_path) = origin.path.clone() else {
            // The origin never reached disk; there is no input file to hand
            // the back end, so serve the buffer as-is.
            return Ok(ProxyResponse {
                bytes: origin.bytes,
                content_type: origin.content_type,
            });
        };

        let output = self.cache.derived_path(&request_key, extension);
        let job = TransformJob {
            input: origin_path,
            output: output.clone(),
            width: request.width(),
            height: request.height(),
            quality: self.quality_for(request.format()),
            format: request.format(),
            apng_hint: request.apng_hint(),
        };

        let backend = Arc::clone(&self.backend);
        let outcome = tokio::task::spawn_blocking(move || backend.transform(&job))
            .await
            .map_err(|e| {
                ProxyError::Transform(TransformError::Encode(format!(
                    "transform task panicked: {e}"
                )))
            })?;

        match outcome {
            Ok(()) => match tokio::fs::read(&output).await {
                Ok(bytes) => Ok(ProxyResponse {
                    bytes: bytes.into(),
                    content_type: request.format().content_type().to_string(),
                }),
                // Swept the instant it was written; the origin is still good.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProxyResponse {
                    bytes: origin.bytes,
                    content_type: origin.content_type,
                }),
                Err(e) => Err(e.into()),
            },
            Err(err) => {
                info!(
                    url = request.remote_url(),
                    error = %err,
                    "transform failed, serving origin as-is"
                );
                Ok(ProxyResponse {
                    bytes: origin.bytes,
                    content_type: origin.content_type,
                })
            }
        }
    }

    /// Returns the cached origin, fetching and persisting it on a miss.
    async fn load_origin(
        &self,
        key: &CacheKey,
        url: &str,
    ) -> Result<LoadedOrigin, ProxyError> {
        if let Some((path, meta)) = self.cache.lookup_origin(key).await {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!(url, "origin cache hit");
                    return Ok(LoadedOrigin {
                        bytes: bytes.into(),
                        content_type: meta.content_type,
                        path: Some(path),
                    });
                }
                // Swept between lookup and open; re-enter the fetch path.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        debug!(url, "origin cache miss");
        let fetched = self.fetcher.fetch(url).await?;

        match self
            .cache
            .store_origin(key, &fetched.bytes, &fetched.content_type)
            .await
        {
            Ok(path) => Ok(LoadedOrigin {
                bytes: fetched.bytes,
                content_type: fetched.content_type,
                path: Some(path),
            }),
            Err(e) => {
                warn!(url, error = %e, "failed to persist origin entry, serving from memory");
                Ok(LoadedOrigin {
                    bytes: fetched.bytes,
                    content_type: fetched.content_type,
                    path: None,
                })
            }
        }
    }

    const fn quality_for(&self, format: OutputFormat) -> u8 {
        match format {
            OutputFormat::Jpeg => self.jpeg_quality,
            // Lossless formats ignore the value; the quantizer carries its
            // own range.
            OutputFormat::Webp | OutputFormat::Png | OutputFormat::PngQuantized
            | OutputFormat::Gif => self.webp_quality,
        }
    }
}
