//! Persistence collaborator trait.

use async_trait::async_trait;

use adreel_models::{Job, JobId, Stage, StageName};

use crate::error::RepositoryResult;

/// Contract for job/stage record storage.
///
/// Stage records are keyed by (job id, stage name) and belong to exactly one
/// job; deleting a job (an external concern) cascades to its stages.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job together with all of its stages, atomically.
    async fn create_job(&self, job: &Job, stages: &[Stage]) -> RepositoryResult<()>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: &JobId) -> RepositoryResult<Job>;

    /// Replace a job record.
    async fn update_job(&self, job: &Job) -> RepositoryResult<()>;

    /// Fetch one stage of a job.
    async fn get_stage(&self, job_id: &JobId, name: StageName) -> RepositoryResult<Stage>;

    /// Replace a stage record.
    async fn update_stage(&self, stage: &Stage) -> RepositoryResult<()>;

    /// All stages of a job, in canonical pipeline order regardless of
    /// insertion order.
    async fn list_stages(&self, job_id: &JobId) -> RepositoryResult<Vec<Stage>>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> RepositoryResult<()>;
}
