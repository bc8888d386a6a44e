//! Runs one export through its lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use vexport_models::{ExportRecord, ExportStatus};
use vexport_queue::RenderExportJob;
use vexport_renderer::{CommandRunner, RendererCommand};
use vexport_storage::ArtifactStore;
use vexport_store::{ExportRepository, SettingsProvider};

use crate::error::WorkerResult;

/// Drives a single export record from `pending` to a terminal state.
///
/// All status writes for in-flight records happen here. The record is
/// marked `in_progress` before the renderer is spawned, so a crash
/// mid-render leaves a stuck `in_progress` record for the sweeper to
/// recover rather than a silently re-runnable `pending` one.
pub struct ExportOrchestrator {
    repo: Arc<dyn ExportRepository>,
    settings: Arc<SettingsProvider>,
    artifacts: Arc<ArtifactStore>,
    runner: Arc<dyn CommandRunner>,
    renderer_binary: PathBuf,
}

impl ExportOrchestrator {
    pub fn new(
        repo: Arc<dyn ExportRepository>,
        settings: Arc<SettingsProvider>,
        artifacts: Arc<ArtifactStore>,
        runner: Arc<dyn CommandRunner>,
        renderer_binary: PathBuf,
    ) -> Self {
        Self {
            repo,
            settings,
            artifacts,
            runner,
            renderer_binary,
        }
    }

    /// Run one job to completion.
    ///
    /// Returns `Ok` for every resolved outcome, including renders that
    /// failed: a failed render is a failed *export*, recorded as such.
    /// An `Err` means the outcome could not be persisted and the job
    /// should stay pending in the queue.
    pub async fn run(&self, job: &RenderExportJob) -> WorkerResult<()> {
        let Some(mut record) = self.repo.find(&job.export_id).await? else {
            warn!(
                "Export {} no longer exists, dropping job {}",
                job.export_id, job.job_id
            );
            return Ok(());
        };

        match record.status {
            ExportStatus::Pending => {}
            ExportStatus::Cancelled => {
                info!("Export {} was cancelled, skipping render", record.id);
                return Ok(());
            }
            other => {
                warn!(
                    "Export {} is {}, not pending; dropping job {}",
                    record.id, other, job.job_id
                );
                return Ok(());
            }
        }

        record.begin()?;
        self.repo.update(&record).await?;
        info!("Export {} started (job {})", record.id, job.job_id);

        match self.execute(&mut record).await {
            Ok(()) => {
                if self.persist_outcome(&record).await? {
                    info!("Export {} finished as {}", record.id, record.status);
                }
                Ok(())
            }
            Err(e) => {
                error!("Export {} orchestration error: {}", record.id, e);
                // Leave a terminal record behind so the export does not
                // sit in_progress until the sweeper finds it.
                if record.status == ExportStatus::InProgress
                    && record.fail(Some(e.to_string())).is_ok()
                {
                    if let Err(persist) = self.persist_outcome(&record).await {
                        error!(
                            "Export {} could not be marked failed: {}",
                            record.id, persist
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Persist a terminal outcome, unless the stored record stopped
    /// being `in_progress` while the render ran. Cancellation and
    /// deletion win the race; the render's outcome is discarded.
    async fn persist_outcome(&self, record: &ExportRecord) -> WorkerResult<bool> {
        match self.repo.find(&record.id).await? {
            Some(stored) if stored.status == ExportStatus::InProgress => {
                self.repo.update(record).await?;
                Ok(true)
            }
            Some(stored) => {
                info!(
                    "Export {} became {} during render, discarding outcome",
                    record.id, stored.status
                );
                Ok(false)
            }
            None => {
                info!(
                    "Export {} was deleted during render, discarding outcome",
                    record.id
                );
                Ok(false)
            }
        }
    }

    /// Build the command, run it, and move the record to `completed` or
    /// `failed`. The caller persists the record.
    async fn execute(&self, record: &mut ExportRecord) -> WorkerResult<()> {
        // Settings edits come from the API process; re-read them so each
        // render picks up the latest values.
        let settings = self.settings.fresh_snapshot().await?;
        let artifact = self.artifacts.allocate(&record.request);

        let cmd = RendererCommand::new(
            &self.renderer_binary,
            &record.request,
            &settings.renderer,
            &artifact.path,
        );
        info!("Export {}: {}", record.id, cmd.display_redacted());

        let outcome = match self.runner.run(&cmd).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Export {} renderer did not start: {}", record.id, e);
                record.fail(Some(e.to_string()))?;
                return Ok(());
            }
        };

        let succeeded = outcome.success();
        let output = if outcome.output.trim().is_empty() {
            "N/A".to_string()
        } else {
            outcome.output
        };

        if succeeded {
            record.complete(artifact.public_url, output)?;
        } else {
            warn!(
                "Export {} render failed (exit code {:?}, timed_out {})",
                record.id, outcome.exit_code, outcome.timed_out
            );
            record.fail(Some(output))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    use vexport_models::ExportRequest;
    use vexport_renderer::{RendererError, RendererResult, RunOutcome};
    use vexport_store::{MemoryExportRepository, MemorySettingsStore, SettingsStore};

    /// Scripted runner returning a fixed outcome, recording invocations.
    struct StubRunner {
        outcome: Mutex<Option<RendererResult<RunOutcome>>>,
        calls: AtomicUsize,
    }

    impl StubRunner {
        fn succeeding(output: &str) -> Self {
            Self::with(Ok(RunOutcome {
                exit_code: Some(0),
                output: output.to_string(),
                timed_out: false,
            }))
        }

        fn failing(code: i32, output: &str) -> Self {
            Self::with(Ok(RunOutcome {
                exit_code: Some(code),
                output: output.to_string(),
                timed_out: false,
            }))
        }

        fn unspawnable() -> Self {
            Self::with(Err(RendererError::BinaryNotFound("gone".into())))
        }

        fn with(outcome: RendererResult<RunOutcome>) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, _cmd: &RendererCommand) -> RendererResult<RunOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
                .lock()
                .await
                .take()
                .unwrap_or_else(|| panic!("runner invoked more than once"))
        }
    }

    /// Runner that mutates the stored record mid-render, then reports a
    /// successful exit.
    struct MidRenderRunner {
        repo: Arc<MemoryExportRepository>,
        id: vexport_models::ExportId,
        delete: bool,
    }

    #[async_trait]
    impl CommandRunner for MidRenderRunner {
        async fn run(&self, _cmd: &RendererCommand) -> RendererResult<RunOutcome> {
            if self.delete {
                self.repo.delete(&self.id).await.unwrap();
            } else {
                let mut stored = self.repo.find(&self.id).await.unwrap().unwrap();
                stored.cancel().unwrap();
                self.repo.update(&stored).await.unwrap();
            }
            Ok(RunOutcome {
                exit_code: Some(0),
                output: "rendered".to_string(),
                timed_out: false,
            })
        }
    }

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
        runner: Arc<StubRunner>,
        orchestrator: ExportOrchestrator,
        _dir: tempfile::TempDir,
    }

    fn fixture(runner: StubRunner) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryExportRepository::new());
        let runner = Arc::new(runner);
        let settings = Arc::new(SettingsProvider::new(
            Arc::new(MemorySettingsStore::new()) as Arc<dyn SettingsStore>,
        ));
        let artifacts = Arc::new(ArtifactStore::new(
            dir.path(),
            "http://localhost:8000/storage",
        ));

        let orchestrator = ExportOrchestrator::new(
            Arc::clone(&repo) as Arc<dyn ExportRepository>,
            settings,
            artifacts,
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            PathBuf::from("bin/goexport/GoExport_CLI"),
        );

        Fixture {
            repo,
            runner,
            orchestrator,
            _dir: dir,
        }
    }

    async fn seeded(repo: &MemoryExportRepository) -> ExportRecord {
        let record = ExportRecord::new(request());
        repo.create(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_successful_render_completes_record() {
        let fx = fixture(StubRunner::succeeding("rendered fine"));
        let record = seeded(&fx.repo).await;
        let job = RenderExportJob::new(record.id.clone(), record.request.clone());

        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Completed);
        let url = stored.artifact_url.unwrap();
        assert!(url.starts_with("http://localhost:8000/storage/exports/42.v1 "));
        assert_eq!(stored.process_output.as_deref(), Some("rendered fine"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_record_with_output() {
        let fx = fixture(StubRunner::failing(3, "renderer exploded"));
        let record = seeded(&fx.repo).await;
        let job = RenderExportJob::new(record.id.clone(), record.request.clone());

        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
        assert!(stored.artifact_url.is_none());
        assert_eq!(stored.process_output.as_deref(), Some("renderer exploded"));
    }

    #[tokio::test]
    async fn test_empty_output_is_recorded_as_na() {
        let fx = fixture(StubRunner::failing(1, "  \n"));
        let record = seeded(&fx.repo).await;
        let job = RenderExportJob::new(record.id.clone(), record.request.clone());

        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.process_output.as_deref(), Some("N/A"));
    }

    #[tokio::test]
    async fn test_spawn_failure_resolves_as_failed() {
        let fx = fixture(StubRunner::unspawnable());
        let record = seeded(&fx.repo).await;
        let job = RenderExportJob::new(record.id.clone(), record.request.clone());

        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
        assert!(stored
            .process_output
            .unwrap()
            .contains("renderer binary not found"));
    }

    #[tokio::test]
    async fn test_cancelled_record_is_not_rendered() {
        let runner = StubRunner::succeeding("should not run");
        let fx = fixture(runner);
        let mut record = seeded(&fx.repo).await;
        record.cancel().unwrap();
        fx.repo.update(&record).await.unwrap();

        let job = RenderExportJob::new(record.id.clone(), record.request.clone());
        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Cancelled);
        assert_eq!(fx.runner.calls(), 0);
    }

    fn orchestrator_with(
        repo: &Arc<MemoryExportRepository>,
        runner: Arc<dyn CommandRunner>,
        dir: &tempfile::TempDir,
    ) -> ExportOrchestrator {
        let settings = Arc::new(SettingsProvider::new(
            Arc::new(MemorySettingsStore::new()) as Arc<dyn SettingsStore>,
        ));
        let artifacts = Arc::new(ArtifactStore::new(
            dir.path(),
            "http://localhost:8000/storage",
        ));
        ExportOrchestrator::new(
            Arc::clone(repo) as Arc<dyn ExportRepository>,
            settings,
            artifacts,
            runner,
            PathBuf::from("bin/goexport/GoExport_CLI"),
        )
    }

    #[tokio::test]
    async fn test_cancel_during_render_discards_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryExportRepository::new());
        let record = seeded(&repo).await;
        let runner = Arc::new(MidRenderRunner {
            repo: Arc::clone(&repo),
            id: record.id.clone(),
            delete: false,
        });
        let orchestrator = orchestrator_with(&repo, runner, &dir);

        let job = RenderExportJob::new(record.id.clone(), record.request.clone());
        orchestrator.run(&job).await.unwrap();

        // The cancellation wins; the successful render must not
        // resurrect the record.
        let stored = repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Cancelled);
        assert!(stored.artifact_url.is_none());
        assert!(stored.process_output.is_none());
    }

    #[tokio::test]
    async fn test_delete_during_render_drops_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryExportRepository::new());
        let record = seeded(&repo).await;
        let runner = Arc::new(MidRenderRunner {
            repo: Arc::clone(&repo),
            id: record.id.clone(),
            delete: true,
        });
        let orchestrator = orchestrator_with(&repo, runner, &dir);

        let job = RenderExportJob::new(record.id.clone(), record.request.clone());
        orchestrator.run(&job).await.unwrap();

        assert!(repo.find(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_record_drops_job() {
        let fx = fixture(StubRunner::succeeding("unused"));
        let job = RenderExportJob::new(vexport_models::ExportId::new(), request());

        // Resolves without error; the queue entry can be acked.
        fx.orchestrator.run(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_already_completed_record_is_not_rerun() {
        let runner = StubRunner::succeeding("should not run");
        let fx = fixture(runner);
        let mut record = seeded(&fx.repo).await;
        record.begin().unwrap();
        record.complete("url", "done").unwrap();
        fx.repo.update(&record).await.unwrap();

        let job = RenderExportJob::new(record.id.clone(), record.request.clone());
        fx.orchestrator.run(&job).await.unwrap();

        let stored = fx.repo.find(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Completed);
        assert_eq!(stored.process_output.as_deref(), Some("done"));
        assert_eq!(fx.runner.calls(), 0);
    }
}
