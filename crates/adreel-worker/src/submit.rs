//! Job intake and edit/retry entry points.
//!
//! Intake validates the brief before anything is persisted or enqueued;
//! validation failures surface directly to the caller and never enter the
//! queue. Edit/retry is the single backward transition in the job state
//! machine: version bump, history entry, stages reset, re-enqueue.

use tracing::info;

use adreel_models::{AdBrief, Job, JobId, PipelineError, Stage, StageName};
use adreel_queue::{JobQueue, RenderAdJob};
use adreel_repository::JobStore;

use crate::error::WorkerResult;

/// Validate a brief and persist the Job plus its four Stages atomically.
///
/// Returns the job and the payload to enqueue. Split from [`submit_job`] so
/// callers without a live queue (tests, offline tooling) can drive the
/// processor directly.
pub async fn prepare_job(repo: &dyn JobStore, brief: AdBrief) -> WorkerResult<(Job, RenderAdJob)> {
    brief.validate()?;

    let job = Job::new(brief);
    let stages: Vec<Stage> = StageName::ALL
        .iter()
        .map(|name| Stage::new(job.id.clone(), *name))
        .collect();

    repo.create_job(&job, &stages).await?;

    let payload = RenderAdJob::new(job.id.clone(), job.version);
    Ok((job, payload))
}

/// Accept a validated request: persist the records and enqueue.
pub async fn submit_job(
    repo: &dyn JobStore,
    queue: &JobQueue,
    brief: AdBrief,
) -> WorkerResult<JobId> {
    let (job, payload) = prepare_job(repo, brief).await?;
    queue.enqueue(&payload).await?;

    info!(job_id = %job.id, "Job submitted");
    Ok(job.id)
}

/// Reset a terminal job back to pending for edit/retry.
///
/// `new_brief` replaces the input parameters when the user edited them.
/// Returns the payload to enqueue for the new version.
pub async fn prepare_retry(
    repo: &dyn JobStore,
    job_id: &JobId,
    new_brief: Option<AdBrief>,
) -> WorkerResult<RenderAdJob> {
    let job = repo.get_job(job_id).await?;

    if !job.status.is_terminal() {
        return Err(PipelineError::validation(format!(
            "job {job_id} is still in progress and cannot be retried"
        ))
        .into());
    }

    let operation = if new_brief.is_some() { "edit_brief" } else { "retry" };
    let mut job = job.reset_for_retry(operation);
    if let Some(brief) = new_brief {
        brief.validate()?;
        job.brief = brief;
    }

    let stages = repo.list_stages(job_id).await?;
    for stage in stages {
        repo.update_stage(&stage.reset()).await?;
    }
    repo.update_job(&job).await?;

    info!(job_id = %job.id, version = job.version, operation = operation, "Job reset");
    Ok(RenderAdJob::new(job.id.clone(), job.version))
}

/// Reset and re-enqueue a terminal job.
pub async fn retry_job(
    repo: &dyn JobStore,
    queue: &JobQueue,
    job_id: &JobId,
    new_brief: Option<AdBrief>,
) -> WorkerResult<()> {
    let payload = prepare_retry(repo, job_id, new_brief).await?;
    queue.enqueue(&payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::{ErrorKind, JobStatus, StageStatus};
    use adreel_repository::MemoryJobStore;

    fn brief() -> AdBrief {
        AdBrief::new("Solar Kettle", "energetic", "Order yours today")
    }

    #[tokio::test]
    async fn test_prepare_job_creates_all_stages_pending() {
        let repo = MemoryJobStore::new();
        let (job, payload) = prepare_job(&repo, brief()).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(payload.job_id, job.id);
        assert_eq!(payload.version, 1);

        let stages = repo.list_stages(&job.id).await.unwrap();
        assert_eq!(stages.len(), 4);
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending && s.progress == 0));
    }

    #[tokio::test]
    async fn test_invalid_brief_never_persists() {
        let repo = MemoryJobStore::new();
        let bad = AdBrief::new("", "energetic", "Order yours today");

        let err = prepare_job(&repo, bad).await.unwrap_err();
        match err {
            crate::error::WorkerError::Pipeline(e) => assert_eq!(e.kind, ErrorKind::Validation),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_requires_terminal_job() {
        let repo = MemoryJobStore::new();
        let (job, _) = prepare_job(&repo, brief()).await.unwrap();

        let err = prepare_retry(&repo, &job.id, None).await.unwrap_err();
        assert!(matches!(err, crate::error::WorkerError::Pipeline(_)));
    }

    #[tokio::test]
    async fn test_retry_resets_job_and_stages() {
        let repo = MemoryJobStore::new();
        let (job, _) = prepare_job(&repo, brief()).await.unwrap();

        // Drive the job to failed with one completed stage.
        let stages = repo.list_stages(&job.id).await.unwrap();
        repo.update_stage(&stages[0].clone().start().complete(serde_json::json!({})))
            .await
            .unwrap();
        repo.update_job(&job.clone().start().fail(StageName::VoiceGen, "upstream down"))
            .await
            .unwrap();

        let payload = prepare_retry(&repo, &job.id, None).await.unwrap();
        assert_eq!(payload.version, 2);

        let job = repo.get_job(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.version, 2);
        assert_eq!(job.edit_history.len(), 1);

        let stages = repo.list_stages(&job.id).await.unwrap();
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending && s.payload.is_none()));
    }

    #[tokio::test]
    async fn test_edit_replaces_brief() {
        let repo = MemoryJobStore::new();
        let (job, _) = prepare_job(&repo, brief()).await.unwrap();
        repo.update_job(&job.clone().start().fail(StageName::ScriptGen, "rejected"))
            .await
            .unwrap();

        let edited = AdBrief::new("Solar Kettle Pro", "calm", "Buy now");
        prepare_retry(&repo, &job.id, Some(edited.clone())).await.unwrap();

        let job = repo.get_job(&job.id).await.unwrap();
        assert_eq!(job.brief, edited);
        assert_eq!(job.edit_history[0].operation, "edit_brief");
    }
}
