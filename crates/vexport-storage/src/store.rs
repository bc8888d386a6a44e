//! Artifact allocation, lookup and deletion.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use vexport_models::ExportRequest;

use crate::error::{StorageError, StorageResult};

/// A freshly allocated output slot for one render.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    /// File name within the exports directory
    pub file_name: String,
    /// Absolute path the renderer writes to
    pub path: PathBuf,
    /// Externally reachable URL for the finished artifact
    pub public_url: String,
}

/// Filesystem-backed store for export artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    public_base_url: String,
}

impl ArtifactStore {
    /// Create a store rooted at `root`, serving URLs under
    /// `{public_base_url}/exports/`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ensure the exports directory exists.
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a unique output slot for one render attempt.
    ///
    /// The uuid makes concurrent allocations for identical requests
    /// collision-free; retries get a fresh name and the old file is left
    /// for the retention sweeper.
    pub fn allocate(&self, request: &ExportRequest) -> ArtifactFile {
        let file_name = format!(
            "{}.{} {}.mp4",
            request.owner_id,
            request.video_id,
            Uuid::new_v4()
        );
        ArtifactFile {
            path: self.root.join(&file_name),
            public_url: self.public_url(&file_name),
            file_name,
        }
    }

    /// Public URL for a file in the store.
    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/exports/{}", self.public_base_url, file_name)
    }

    /// Resolve an artifact URL (or bare name) back to a path inside the
    /// store. Only the basename is honoured, so a crafted URL can never
    /// escape the exports directory.
    pub fn path_for_url(&self, artifact_url: &str) -> StorageResult<PathBuf> {
        let name = artifact_url.rsplit('/').next().unwrap_or(artifact_url);
        if name.is_empty() || name.contains("..") || name.contains('\\') {
            return Err(StorageError::InvalidName(artifact_url.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Whether an artifact exists on disk.
    pub async fn exists(&self, artifact_url: &str) -> StorageResult<bool> {
        let path = self.path_for_url(artifact_url)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Delete an artifact. Missing files are not an error, so the
    /// retention sweep stays idempotent.
    pub async fn delete(&self, artifact_url: &str) -> StorageResult<()> {
        let path = self.path_for_url(artifact_url)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted artifact {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Read a completed artifact for download.
    pub async fn read(&self, artifact_url: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for_url(artifact_url)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
