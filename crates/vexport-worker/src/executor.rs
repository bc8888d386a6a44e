//! Queue consumption with a bounded render permit pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vexport_queue::{ExportQueue, RenderExportJob};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::orchestrator::ExportOrchestrator;

/// Consumes render jobs and executes them through the orchestrator.
///
/// Every render holds a semaphore permit for its whole run. The pool is
/// sized by `max_concurrent_renders`, which is 1 in the standard
/// deployment: all renders capture from the same display and sink, so
/// two at once corrupt each other's output.
pub struct RenderExecutor {
    config: WorkerConfig,
    queue: Arc<ExportQueue>,
    orchestrator: Arc<ExportOrchestrator>,
    render_permits: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl RenderExecutor {
    /// Create a new executor.
    pub fn new(
        config: WorkerConfig,
        queue: ExportQueue,
        orchestrator: Arc<ExportOrchestrator>,
    ) -> Self {
        let render_permits = Arc::new(Semaphore::new(config.max_concurrent_renders));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("renderer-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            orchestrator,
            render_permits,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting render executor '{}' with {} render slot(s)",
            self.consumer_name, self.config.max_concurrent_renders
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically reclaim jobs a crashed worker left unacked.
        let queue_clone = Arc::clone(&self.queue);
        let orchestrator_clone = Arc::clone(&self.orchestrator);
        let permits_clone = Arc::clone(&self.render_permits);
        let consumer_name = self.consumer_name.clone();
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = self.config.claim_min_idle;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone
                            .claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5)
                            .await
                        {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} orphaned render jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let permit = match Arc::clone(&permits_clone).acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };
                                    let orchestrator = Arc::clone(&orchestrator_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(orchestrator, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim orphaned jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming render jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight renders to finish...");
        let _ = tokio::time::timeout(self.config.run_timeout, self.wait_for_renders()).await;

        info!("Render executor stopped");
        Ok(())
    }

    /// Consume and dispatch jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.render_permits.available_permits();
        if available == 0 {
            // Render slot busy; don't pull work we cannot start
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available)
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} render jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = match Arc::clone(&self.render_permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return Ok(()),
            };
            let orchestrator = Arc::clone(&self.orchestrator);
            let queue = Arc::clone(&self.queue);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(orchestrator, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute one job and ack it once its outcome is durable.
    ///
    /// A job is only acked after the orchestrator persisted a result, so
    /// a crash mid-render leaves the message pending for the claim loop.
    async fn execute_job(
        orchestrator: Arc<ExportOrchestrator>,
        queue: Arc<ExportQueue>,
        message_id: String,
        job: RenderExportJob,
    ) {
        let job_id = job.job_id.clone();

        match orchestrator.run(&job).await {
            Ok(()) => {
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack render job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                // Outcome not persisted; leave the message for reclaim
                error!("Render job {} unresolved: {}", job_id, e);
            }
        }
    }

    /// Wait until every render permit is back in the pool.
    async fn wait_for_renders(&self) {
        loop {
            if self.render_permits.available_permits() == self.config.max_concurrent_renders {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
