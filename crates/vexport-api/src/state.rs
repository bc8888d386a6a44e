//! Application state.

use std::sync::Arc;

use vexport_queue::{Dispatcher, ExportQueue};
use vexport_storage::ArtifactStore;
use vexport_store::{
    ExportRepository, RedisExportRepository, RedisSettingsStore, SettingsProvider, SettingsStore,
};

use crate::config::ApiConfig;

/// Shared application state.
///
/// The repository, settings and dispatcher sit behind traits so handler
/// tests run against in-memory stand-ins.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub repo: Arc<dyn ExportRepository>,
    pub settings: Arc<SettingsProvider>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub artifacts: Arc<ArtifactStore>,
}

impl AppState {
    /// Create new application state backed by Redis and the local
    /// exports directory.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let repo = RedisExportRepository::from_env()?;
        let settings_store = RedisSettingsStore::from_env()?;
        let queue = ExportQueue::from_env()?;

        let artifacts =
            ArtifactStore::new(&config.exports_dir, config.public_base_url.as_str());
        artifacts.init().await?;

        Ok(Self {
            config,
            repo: Arc::new(repo),
            settings: Arc::new(SettingsProvider::new(
                Arc::new(settings_store) as Arc<dyn SettingsStore>
            )),
            dispatcher: Arc::new(queue),
            artifacts: Arc::new(artifacts),
        })
    }
}
