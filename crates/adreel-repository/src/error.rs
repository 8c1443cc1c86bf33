//! Repository error types.

use thiserror::Error;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Stage not found: {0}/{1}")]
    StageNotFound(String, String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
