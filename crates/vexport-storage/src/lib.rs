//! Local artifact store for rendered exports.
//!
//! Artifacts live in a single exports directory and are addressed by
//! generated file names; completed exports are handed out as public URLs
//! under `{base}/exports/{name}`.

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{ArtifactFile, ArtifactStore};
