//! Error types for renderer invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

/// Errors that prevent a render from being attempted at all.
///
/// A renderer that starts and exits non-zero is *not* an error here; that
/// outcome is reported through `RunOutcome` so the orchestrator can
/// resolve the export to `failed` with the captured diagnostics.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("renderer binary not found: {0}")]
    BinaryNotFound(PathBuf),

    #[error("failed to start renderer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
