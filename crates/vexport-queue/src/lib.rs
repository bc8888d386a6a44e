//! Redis Streams queue for render jobs.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams
//! - Worker consumption with crash recovery via XCLAIM
//! - A `Dispatcher` seam so the API layer can be tested without Redis
//!
//! There is no DLQ or automatic retry: an export is attempted exactly
//! once per enqueue, and retries are an explicit caller operation that
//! re-enqueues a fresh job.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::RenderExportJob;
pub use queue::{Dispatcher, ExportQueue, QueueConfig};
