//! Export render worker.
//!
//! This crate provides:
//! - The export orchestrator (lifecycle state machine)
//! - A single-permit executor that serializes renders on the shared
//!   virtual display
//! - The retention sweeper (artifact purge + stuck-record recovery)
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod sweeper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::RenderExecutor;
pub use orchestrator::ExportOrchestrator;
pub use sweeper::RetentionSweeper;
