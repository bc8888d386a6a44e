//! Export render worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vexport_queue::ExportQueue;
use vexport_renderer::RendererRunner;
use vexport_storage::ArtifactStore;
use vexport_store::{
    ExportRepository, RedisExportRepository, RedisSettingsStore, SettingsProvider, SettingsStore,
};
use vexport_worker::{ExportOrchestrator, RenderExecutor, RetentionSweeper, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vexport=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vexport-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let repo: Arc<dyn ExportRepository> = match RedisExportRepository::from_env() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("Failed to create export repository: {}", e);
            std::process::exit(1);
        }
    };

    let settings_store: Arc<dyn SettingsStore> = match RedisSettingsStore::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create settings store: {}", e);
            std::process::exit(1);
        }
    };
    let settings = Arc::new(SettingsProvider::new(settings_store));

    let artifacts = Arc::new(ArtifactStore::new(
        &config.exports_dir,
        config.public_base_url.as_str(),
    ));
    if let Err(e) = artifacts.init().await {
        error!("Failed to initialize exports directory: {}", e);
        std::process::exit(1);
    }

    let runner = Arc::new(RendererRunner::new().with_ceiling(config.run_timeout));

    let orchestrator = Arc::new(ExportOrchestrator::new(
        Arc::clone(&repo),
        Arc::clone(&settings),
        Arc::clone(&artifacts),
        runner,
        config.renderer_binary.clone(),
    ));

    let queue = match ExportQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create export queue: {}", e);
            std::process::exit(1);
        }
    };

    let sweeper = RetentionSweeper::new(
        Arc::clone(&repo),
        Arc::clone(&settings),
        Arc::clone(&artifacts),
        config.run_timeout,
        config.sweep_interval,
    );

    let (sweeper_shutdown, sweeper_shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper_task = tokio::spawn(async move {
        sweeper.run(sweeper_shutdown_rx).await;
    });

    let executor = Arc::new(RenderExecutor::new(config, queue, orchestrator));

    // Propagate ctrl-c to the executor and the sweeper
    let executor_for_signal = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        executor_for_signal.shutdown();
        let _ = sweeper_shutdown.send(true);
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    sweeper_task.await.ok();

    info!("Worker shutdown complete");
}
