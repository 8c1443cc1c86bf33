//! Job processing: the Job/Stage state machine.
//!
//! One call to [`run_job`] advances a job as far as it can go: it executes
//! pending stages strictly in canonical order, publishes progress, and
//! resolves each failure into retry-same-stage or fail-the-job. Exactly one
//! stage of a job is in flight at a time; concurrency exists only across
//! jobs, in the executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use adreel_assets::AssetManager;
use adreel_generate::Generator;
use adreel_models::{
    overall_progress, ComposeOutput, Job, JobEvent, JobStatus, RetryPolicy, Stage, StageName,
    StageStatus,
};
use adreel_queue::{ProgressEvent, ProgressSink, RenderAdJob};
use adreel_repository::{JobStore, RepositoryError};
use adreel_storage::{ObjectStore, RemoteObjectCache};

use crate::compose::Composer;
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::stages::{run_stage, stage_subdir};

/// Everything a worker needs to process jobs. Built once at startup and
/// injected; no ambient globals.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub repo: Arc<dyn JobStore>,
    pub store: Arc<dyn ObjectStore>,
    pub cache: Arc<RemoteObjectCache>,
    pub generator: Arc<dyn Generator>,
    pub composer: Arc<dyn Composer>,
    pub progress: Arc<dyn ProgressSink>,
}

impl ProcessingContext {
    /// Retry policy shorthand.
    pub fn retry(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Publish a progress event; failures are logged, never fatal.
    pub async fn publish(&self, job: &Job, event: JobEvent) {
        let result = self
            .progress
            .publish(&ProgressEvent {
                job_id: job.id.clone(),
                event,
            })
            .await;
        if let Err(e) = result {
            warn!(job_id = %job.id, error = %e, "Failed to publish progress event");
        }
    }

    /// Persist and publish an in-stage progress update (e.g. per scene).
    pub async fn report_stage_progress(&self, job: &Job, stage: &Stage, pct: u8) {
        let updated = match self.repo.get_stage(&job.id, stage.name).await {
            Ok(s) => s.with_progress(pct),
            Err(e) => {
                warn!(job_id = %job.id, stage = %stage.name, error = %e, "Failed to load stage for progress");
                return;
            }
        };
        if let Err(e) = self.repo.update_stage(&updated).await {
            warn!(job_id = %job.id, stage = %stage.name, error = %e, "Failed to persist stage progress");
            return;
        }
        let overall = match self.repo.list_stages(&job.id).await {
            Ok(stages) => overall_progress(&stages),
            Err(_) => return,
        };
        self.publish(job, JobEvent::progress(stage.name, updated.progress, overall))
            .await;
    }
}

/// Result of one processing pass over a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// All stages completed; job is terminal-success.
    Completed,
    /// A stage failed retryably; re-enqueue it after `delay`.
    RetryStage {
        stage: StageName,
        attempt: u32,
        delay: Duration,
    },
    /// A stage failed terminally; job is terminal-failure.
    Failed { stage: StageName },
    /// Stale or already-terminal payload; nothing was done.
    Skipped,
}

/// Process one queue payload.
pub async fn run_job(ctx: &ProcessingContext, payload: &RenderAdJob) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::new(&payload.job_id);

    let job = match ctx.repo.get_job(&payload.job_id).await {
        Ok(job) => job,
        Err(RepositoryError::JobNotFound(_)) => {
            logger.log_warning("Job record missing, dropping payload");
            return Ok(JobOutcome::Skipped);
        }
        Err(e) => return Err(e.into()),
    };

    // Payloads from before an edit/retry reset carry a stale version.
    if job.version != payload.version {
        logger.log_warning("Stale payload version, dropping");
        return Ok(JobOutcome::Skipped);
    }
    if job.status.is_terminal() {
        logger.log_warning("Job already terminal, dropping payload");
        return Ok(JobOutcome::Skipped);
    }

    // Honor stage-retry backoff delivered ahead of time.
    if let Some(not_before) = payload.not_before {
        let now = Utc::now();
        if let Ok(remaining) = (not_before - now).to_std() {
            let capped = remaining.min(ctx.retry().max_delay);
            if !capped.is_zero() {
                tokio::time::sleep(capped).await;
            }
        }
    }

    let job = if job.status == JobStatus::Pending {
        let started = job.start();
        ctx.repo.update_job(&started).await?;
        started
    } else {
        job
    };

    let assets = AssetManager::new(&ctx.config.work_dir, job.id.clone());
    assets.create_job_directory().await?;

    logger.log_start("Processing pipeline");
    process_stages(ctx, job, payload, &assets).await
}

/// Execute pending stages in canonical order until done, retry, or failure.
async fn process_stages(
    ctx: &ProcessingContext,
    mut job: Job,
    payload: &RenderAdJob,
    assets: &AssetManager,
) -> WorkerResult<JobOutcome> {
    let stages = ctx.repo.list_stages(&job.id).await?;

    for stage in &stages {
        match stage.status {
            StageStatus::Completed => continue,
            StageStatus::Failed => {
                // A failed stage without a terminal job means a crash midway;
                // finish the bookkeeping now.
                return fail_job(ctx, job, stage.name, "stage failed previously", assets).await;
            }
            StageStatus::Pending | StageStatus::Processing => {}
        }

        let attempt = match payload.resume_from {
            Some(resume) if resume == stage.name => payload.attempt,
            _ => 1,
        };

        let stage_logger = JobLogger::new(&job.id).for_stage(stage.name);

        // Idempotency: a re-run never mixes partial files from a failed
        // attempt with fresh ones.
        if let Some(subdir) = stage_subdir(stage.name) {
            assets.discard_subdir(subdir).await?;
        }

        let started = stage.clone().start();
        ctx.repo.update_stage(&started).await?;
        ctx.publish(&job, JobEvent::stage_started(stage.name)).await;
        stage_logger.log_start("Stage processing");

        let current = ctx.repo.list_stages(&job.id).await?;
        match run_stage(ctx, &job, &current, &started, assets).await {
            Ok(output) => {
                let completed = started.complete(output.payload);
                ctx.repo.update_stage(&completed).await?;

                job = job.add_cost(output.cost);
                ctx.repo.update_job(&job).await?;

                let all = ctx.repo.list_stages(&job.id).await?;
                ctx.publish(
                    &job,
                    JobEvent::progress(stage.name, 100, overall_progress(&all)),
                )
                .await;
                ctx.publish(&job, JobEvent::stage_completed(stage.name)).await;
                stage_logger.log_completion("Stage complete");
            }
            Err(e) => {
                stage_logger.log_error(&format!("Stage failed: {e}"));

                if e.should_retry() && ctx.retry().allows_attempt(attempt) {
                    // Roll the stage back to pending; the executor re-enqueues
                    // it with backoff. The job stays processing and local
                    // assets stay in place for the next attempt.
                    ctx.repo.update_stage(&started.reset()).await?;
                    let delay = ctx.retry().delay_for_attempt(attempt);
                    info!(
                        job_id = %job.id,
                        stage = %stage.name,
                        attempt = attempt,
                        delay_secs = delay.as_secs(),
                        "Retryable stage failure, re-enqueueing"
                    );
                    return Ok(JobOutcome::RetryStage {
                        stage: stage.name,
                        attempt: attempt + 1,
                        delay,
                    });
                }

                let failed = started.fail(e.user_message());
                ctx.repo.update_stage(&failed).await?;
                return fail_job(ctx, job, stage.name, e.user_message(), assets).await;
            }
        }
    }

    // All stages complete: the compositing payload carries the output key.
    let all = ctx.repo.list_stages(&job.id).await?;
    let compose: ComposeOutput = adreel_models::payload::completed_stage(&all, StageName::Compositing)
        .and_then(adreel_models::payload::from_stage)?;

    let job = job.complete(&compose.video_key);
    ctx.repo.update_job(&job).await?;
    ctx.publish(&job, JobEvent::completed(&compose.video_key)).await;
    JobLogger::new(&job.id).log_completion("Job complete");

    // Local tree is only needed until the final upload; remote copies remain.
    assets.cleanup().await;
    Ok(JobOutcome::Completed)
}

/// Mark the job failed, publish, and clean up the asset tree.
async fn fail_job(
    ctx: &ProcessingContext,
    job: Job,
    stage: StageName,
    message: &str,
    assets: &AssetManager,
) -> WorkerResult<JobOutcome> {
    let job = job.fail(stage, message);
    ctx.repo.update_job(&job).await?;
    ctx.publish(&job, JobEvent::failed(stage, message)).await;
    JobLogger::new(&job.id)
        .for_stage(stage)
        .log_error("Job failed");

    assets.cleanup().await;
    Ok(JobOutcome::Failed { stage })
}
