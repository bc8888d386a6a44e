//! Retention sweep and stuck-record recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use vexport_models::ExportStatus;
use vexport_storage::ArtifactStore;
use vexport_store::{ExportRepository, SettingsProvider};

use crate::error::WorkerResult;

/// Output appended to records abandoned by a crashed worker.
const ABANDONED_OUTPUT: &str = "[render abandoned: worker did not report an outcome]";

/// Periodically deletes exports past the retention window and recovers
/// records a crashed worker left `in_progress`.
///
/// Both passes are idempotent, so overlapping or repeated sweeps are
/// harmless.
pub struct RetentionSweeper {
    repo: Arc<dyn ExportRepository>,
    settings: Arc<SettingsProvider>,
    artifacts: Arc<ArtifactStore>,
    run_timeout: Duration,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        repo: Arc<dyn ExportRepository>,
        settings: Arc<SettingsProvider>,
        artifacts: Arc<ArtifactStore>,
        run_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            repo,
            settings,
            artifacts,
            run_timeout,
            sweep_interval,
        }
    }

    /// Run sweeps until shutdown is signalled.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            "Starting retention sweeper (every {}s)",
            self.sweep_interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received, stopping sweeper");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.recover_stuck().await {
                        warn!("Stuck-record recovery failed: {}", e);
                    }
                    if let Err(e) = self.sweep().await {
                        warn!("Retention sweep failed: {}", e);
                    }
                }
            }
        }
    }

    /// Delete exports created before the retention window.
    ///
    /// The artifact goes first and the record second: interrupting the
    /// sweep between the two leaves a record whose download reports a
    /// missing artifact, never an orphaned file nothing points at.
    pub async fn sweep(&self) -> WorkerResult<usize> {
        // Window edits come from the API process; read it fresh each pass.
        let window_minutes = self.settings.fresh_snapshot().await?.purge_after_minutes;
        if window_minutes <= 0 {
            debug!("Retention window disabled, skipping sweep");
            return Ok(0);
        }

        let cutoff = Utc::now() - chrono::Duration::minutes(window_minutes);
        let expired = self.repo.list_older_than(cutoff).await?;

        let mut purged = 0;
        for record in expired {
            // A render may legitimately outlive the window; leave it for
            // the next pass once it resolves.
            if record.status == ExportStatus::InProgress {
                continue;
            }

            if let Some(url) = &record.artifact_url {
                // Best effort, as on user-initiated delete: one bad file
                // must not block the rest of the sweep.
                if let Err(e) = self.artifacts.delete(url).await {
                    warn!(
                        "Could not delete artifact for export {}: {}",
                        record.id, e
                    );
                }
            }
            self.repo.delete(&record.id).await?;
            debug!("Purged export {} ({})", record.id, record.status);
            purged += 1;
        }

        if purged > 0 {
            info!("Purged {} exports past the {window_minutes}m window", purged);
        }
        Ok(purged)
    }

    /// Fail `in_progress` records whose render can no longer be running.
    ///
    /// A record is stuck once it has not been touched for the full run
    /// ceiling: a live render would have resolved or been killed by then.
    pub async fn recover_stuck(&self) -> WorkerResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.run_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
        let stuck = self.repo.list_stuck_in_progress(cutoff).await?;

        let mut recovered = 0;
        for mut record in stuck {
            warn!(
                "Export {} stuck in_progress since {}, marking failed",
                record.id, record.updated_at
            );
            record.fail(Some(ABANDONED_OUTPUT.to_string()))?;
            self.repo.update(&record).await?;
            recovered += 1;
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::fs;

    use vexport_models::{settings::keys, ExportRecord, ExportRequest};
    use vexport_store::{
        MemoryExportRepository, MemorySettingsStore, SettingsStore,
    };

    fn request() -> ExportRequest {
        ExportRequest {
            service: "acme".to_string(),
            owner_id: "42".to_string(),
            video_id: "v1".to_string(),
            aspect_ratio: "16:9".to_string(),
            resolution: "1080p".to_string(),
            outro: false,
        }
    }

    struct Fixture {
        repo: Arc<MemoryExportRepository>,
        settings_store: Arc<MemorySettingsStore>,
        artifacts: Arc<ArtifactStore>,
        sweeper: RetentionSweeper,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryExportRepository::new());
        let settings_store = Arc::new(MemorySettingsStore::new());
        let settings = Arc::new(SettingsProvider::new(
            Arc::clone(&settings_store) as Arc<dyn SettingsStore>,
        ));
        let artifacts = Arc::new(ArtifactStore::new(
            dir.path(),
            "http://localhost:8000/storage",
        ));
        artifacts.init().await.unwrap();

        let sweeper = RetentionSweeper::new(
            Arc::clone(&repo) as Arc<dyn ExportRepository>,
            settings,
            Arc::clone(&artifacts),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        Fixture {
            repo,
            settings_store,
            artifacts,
            sweeper,
            _dir: dir,
        }
    }

    /// Completed export aged past the default 30 minute window, with its
    /// artifact on disk.
    async fn seeded_expired(fx: &Fixture) -> ExportRecord {
        let mut record = ExportRecord::new(request());
        record.begin().unwrap();

        let slot = fx.artifacts.allocate(&record.request);
        fs::write(&slot.path, b"video").await.unwrap();
        record.complete(slot.public_url, "ok").unwrap();

        record.created_at = Utc::now() - chrono::Duration::minutes(90);
        fx.repo.create(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_sweep_deletes_expired_artifact_and_record() {
        let fx = fixture().await;
        let expired = seeded_expired(&fx).await;

        let fresh = ExportRecord::new(request());
        fx.repo.create(&fresh).await.unwrap();

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 1);

        assert!(fx.repo.find(&expired.id).await.unwrap().is_none());
        assert!(fx.repo.find(&fresh.id).await.unwrap().is_some());

        let url = expired.artifact_url.unwrap();
        assert!(!fx.artifacts.exists(&url).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let fx = fixture().await;
        seeded_expired(&fx).await;

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 1);
        assert_eq!(fx.sweeper.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nonpositive_window_disables_sweep() {
        let fx = fixture().await;
        let expired = seeded_expired(&fx).await;

        fx.settings_store
            .set_raw(keys::PURGE_AFTER_MINUTES, json!(0))
            .await
            .unwrap();

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 0);
        assert!(fx.repo.find(&expired.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_reads_window_fresh_each_pass() {
        let fx = fixture().await;
        let expired = seeded_expired(&fx).await;

        // First pass with purging disabled primes any cache
        fx.settings_store
            .set_raw(keys::PURGE_AFTER_MINUTES, json!(-1))
            .await
            .unwrap();
        assert_eq!(fx.sweeper.sweep().await.unwrap(), 0);

        // Re-enable behind the provider's back, as the API process would
        fx.settings_store
            .set_raw(keys::PURGE_AFTER_MINUTES, json!(30))
            .await
            .unwrap();
        assert_eq!(fx.sweeper.sweep().await.unwrap(), 1);
        assert!(fx.repo.find(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_spares_in_progress_records() {
        let fx = fixture().await;

        let mut record = ExportRecord::new(request());
        record.begin().unwrap();
        record.created_at = Utc::now() - chrono::Duration::minutes(90);
        fx.repo.create(&record).await.unwrap();

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 0);
        assert!(fx.repo.find(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_handles_records_without_artifacts() {
        let fx = fixture().await;

        let mut record = ExportRecord::new(request());
        record.begin().unwrap();
        record.fail(Some("boom".to_string())).unwrap();
        record.created_at = Utc::now() - chrono::Duration::minutes(90);
        fx.repo.create(&record).await.unwrap();

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 1);
        assert!(fx.repo.find(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_artifact_failure_does_not_abort_sweep() {
        let fx = fixture().await;

        // Artifact the store refuses to delete
        let mut broken = ExportRecord::new(request());
        broken.begin().unwrap();
        broken
            .complete("exports/..\\nope.mp4".to_string(), "ok")
            .unwrap();
        broken.created_at = Utc::now() - chrono::Duration::minutes(90);
        fx.repo.create(&broken).await.unwrap();

        let expired = seeded_expired(&fx).await;

        assert_eq!(fx.sweeper.sweep().await.unwrap(), 2);
        assert!(fx.repo.find(&broken.id).await.unwrap().is_none());
        assert!(fx.repo.find(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recover_stuck_fails_abandoned_records() {
        let fx = fixture().await;

        let mut stuck = ExportRecord::new(request());
        stuck.begin().unwrap();
        stuck.updated_at = Utc::now() - chrono::Duration::hours(2);
        fx.repo.create(&stuck).await.unwrap();

        let mut live = ExportRecord::new(request());
        live.begin().unwrap();
        fx.repo.create(&live).await.unwrap();

        assert_eq!(fx.sweeper.recover_stuck().await.unwrap(), 1);

        let recovered = fx.repo.find(&stuck.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, ExportStatus::Failed);
        assert_eq!(recovered.process_output.as_deref(), Some(ABANDONED_OUTPUT));

        let untouched = fx.repo.find(&live.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ExportStatus::InProgress);
    }
}
