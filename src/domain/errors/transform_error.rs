//! Transform back-end error types.

use thiserror::Error;

/// Errors the transform back end can report.
///
/// Every variant is recoverable from the request's point of view: the caller
/// falls back to serving the cached origin bytes with their original
/// content-type.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The input is a multi-frame image (animated GIF, APNG, animated WebP);
    /// animated inputs are passed through, never re-encoded.
    #[error("animated input is passed through unchanged")]
    AnimatedInput,

    /// The input could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Decoding would exceed the engine's memory ceiling.
    #[error("image of {required} pixels exceeds the decode limit of {limit}")]
    MemoryLimit {
        /// Pixel count of the input image.
        required: u64,
        /// Maximum pixel count the engine accepts.
        limit: u64,
    },

    /// Re-encoding to the requested output format failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The external palette quantizer failed or is unavailable.
    #[error("quantizer failed: {0}")]
    Quantizer(String),

    /// Reading the origin file or writing the derived file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl std::fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    /// Creates an encode error.
    #[must_use]
    pub fn encode(message: impl std::fmt::Display) -> Self {
        Self::Encode(message.to_string())
    }
}
