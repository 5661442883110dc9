//! Origin fetcher.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::domain::errors::ProxyError;

/// A fetched origin response worth caching.
#[derive(Debug, Clone)]
pub struct FetchedOrigin {
    /// Raw body bytes.
    pub bytes: Bytes,
    /// The `Content-Type` the origin served.
    pub content_type: String,
}

/// HTTP client for origin images: fixed User-Agent, one total deadline.
#[derive(Debug, Clone)]
pub struct OriginFetcher {
    client: reqwest::Client,
}

impl OriginFetcher {
    /// Builds the fetcher with its deadline and User-Agent baked into the
    /// client.
    ///
    /// # Errors
    /// Returns the client builder's error.
    pub fn new(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url` and gates the response.
    ///
    /// # Errors
    /// Transport failures map to [`ProxyError::BadInput`]; a non-200 status
    /// propagates as [`ProxyError::Upstream`]; a `Content-Type` outside
    /// `image/` is rejected as an invalid image.
    pub async fn fetch(&self, url: &str) -> Result<FetchedOrigin, ProxyError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProxyError::bad_input(format!("failed to fetch image: {e}")))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ProxyError::Upstream(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(ProxyError::bad_input("invalid image"));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::bad_input(format!("failed to read origin body: {e}")))?;

        debug!(url, size = bytes.len(), content_type, "fetched origin");
        Ok(FetchedOrigin {
            bytes,
            content_type,
        })
    }
}
