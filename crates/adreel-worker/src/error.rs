//! Worker error types.

use thiserror::Error;

use adreel_models::PipelineError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Stage-level failure; already carries its taxonomy and is never
    /// re-wrapped on the way up.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Repository error: {0}")]
    Repository(#[from] adreel_repository::RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] adreel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
