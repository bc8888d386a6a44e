//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the GoExport CLI renderer binary
    pub renderer_binary: PathBuf,
    /// Directory rendered artifacts are written to
    pub exports_dir: PathBuf,
    /// Base URL completed artifacts are served under
    pub public_base_url: String,
    /// Hard wall-clock ceiling for one render
    pub run_timeout: Duration,
    /// Concurrent renders. The renderer owns display :99 and the null
    /// audio sink exclusively, so anything above 1 corrupts captures.
    pub max_concurrent_renders: usize,
    /// How often to scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Interval between retention sweeps
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            renderer_binary: PathBuf::from("bin/goexport/GoExport_CLI"),
            exports_dir: PathBuf::from("storage/exports"),
            public_base_url: "http://localhost:8000/storage".to_string(),
            run_timeout: Duration::from_secs(3600), // 1 hour
            max_concurrent_renders: 1,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            renderer_binary: std::env::var("RENDERER_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.renderer_binary),
            exports_dir: std::env::var("EXPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.exports_dir),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or(defaults.public_base_url),
            run_timeout: Duration::from_secs(
                std::env::var("RUN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            max_concurrent_renders: std::env::var("WORKER_MAX_RENDERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}
