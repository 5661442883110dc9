//! Request-level error types.

use thiserror::Error;

use super::TransformError;

/// Errors a proxied image request can fail with.
///
/// The presentation layer maps each variant to an HTTP status; the pipeline
/// decides which variants degrade instead of failing the request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request path, operator, or remote URL is malformed, the host does
    /// not resolve, or the origin did not serve an image.
    #[error("bad request: {0}")]
    BadInput(String),

    /// Every resolved address check passed except the deny list.
    #[error("destination address is denied")]
    Forbidden,

    /// The origin answered with a non-200 status, propagated as-is.
    #[error("upstream returned status {0}")]
    Upstream(u16),

    /// Cache or filesystem failure that could not be degraded.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Transform failure that escaped the degraded path.
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

impl ProxyError {
    /// Creates a `BadInput` error.
    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    /// Returns whether this error is the client's fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::BadInput(_) | Self::Forbidden)
    }
}
