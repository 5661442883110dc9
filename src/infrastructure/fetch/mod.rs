//! Outbound fetch path: SSRF guard and origin client.

pub mod guard;
pub mod origin;

pub use guard::{DenyRange, SsrfGuard, DEFAULT_DENY_RANGES};
pub use origin::{FetchedOrigin, OriginFetcher};
