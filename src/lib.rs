//! Hyperproxy - a caching image transformation proxy.
//!
//! Fetches remote images on demand, keeps them in a content-addressed disk
//! cache, resizes and re-encodes them to web-friendly formats, and serves
//! the results with long immutable cache headers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer orchestrating the request flow.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;
/// Presentation layer containing the HTTP surface.
pub mod presentation;

/// Current version of the service.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name.
pub const NAME: &str = "hyperproxy";
