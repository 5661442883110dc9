//! Presentation layer: the HTTP surface.

/// Router and handlers.
pub mod http;

pub use http::router;
