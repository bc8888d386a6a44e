//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] vexport_models::InvalidTransition),

    #[error("Store error: {0}")]
    Store(#[from] vexport_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] vexport_storage::StorageError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] vexport_renderer::RendererError),

    #[error("Queue error: {0}")]
    Queue(#[from] vexport_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
