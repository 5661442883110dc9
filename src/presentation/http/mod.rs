//! HTTP surface.

mod router;

pub use router::{router, AppState};
