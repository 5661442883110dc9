//! Port definition for the transform back end.
//!
//! The heavy pixel work is behind a capability interface so the pipeline
//! stays agnostic of the image library underneath. Implementations receive
//! file paths, never buffers: the origin entry is already on disk and the
//! derived entry must land on disk.

use std::path::PathBuf;

use crate::domain::entities::OutputFormat;
use crate::domain::errors::TransformError;

/// One transform invocation: read the origin file, write the derived file.
#[derive(Debug, Clone)]
pub struct TransformJob {
    /// Path of the cached origin entry.
    pub input: PathBuf,
    /// Path the derived entry must be written to.
    pub output: PathBuf,
    /// Requested width; zero means unconstrained.
    pub width: u32,
    /// Requested height; zero means unconstrained.
    pub height: u32,
    /// Encoder quality (1-100) for lossy formats.
    pub quality: u8,
    /// Output encoding.
    pub format: OutputFormat,
    /// The remote URL named an `.apng` file; treat the input as a candidate
    /// animated PNG even when sniffing is inconclusive.
    pub apng_hint: bool,
}

/// Capability interface of a transform back end.
///
/// Implementations hold process-wide state (memory ceiling, codec registries)
/// and must be safe to call from many tasks at once. Operations are
/// synchronous and CPU-bound; callers run them under `spawn_blocking`.
pub trait TransformBackend: Send + Sync {
    /// Configures the back end's memory ceiling. Called once at boot;
    /// exceeding the ceiling later fails a single transform, not the process.
    ///
    /// # Errors
    /// Returns an error when the back end cannot initialize.
    fn init(&self, memory_limit_bytes: u64) -> Result<(), TransformError>;

    /// Produces the derived file described by `job`.
    ///
    /// # Errors
    /// Any error means "transform failed"; the caller falls back to serving
    /// the origin file with the origin's content-type.
    fn transform(&self, job: &TransformJob) -> Result<(), TransformError>;
}
