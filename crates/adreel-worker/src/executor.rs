//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use adreel_queue::{JobQueue, RenderAdJob};

use crate::error::WorkerResult;
use crate::processor::{run_job, JobOutcome, ProcessingContext};

/// Job executor that processes payloads from the queue.
pub struct JobExecutor {
    ctx: Arc<ProcessingContext>,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(ctx: ProcessingContext, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx: Arc::new(ctx),
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.ctx.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim messages orphaned by crashed workers.
        let queue_clone = Arc::clone(&self.queue);
        let ctx_clone = Arc::clone(&self.ctx);
        let consumer_name = self.consumer_name.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.ctx.config.claim_interval;
        let claim_min_idle = self.ctx.config.claim_min_idle;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone
                            .claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5)
                            .await
                        {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) =
                                        semaphore_clone.clone().acquire_owned().await
                                    else {
                                        break;
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop.
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        // Finish in-flight stages before exiting; no partial, unflagged
        // state may persist.
        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch payloads from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                self.ctx.config.consume_block.as_millis() as u64,
                available.min(4),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let Ok(permit) = self.job_semaphore.clone().acquire_owned().await else {
                warn!("Semaphore closed, dropping consumed job");
                break;
            };

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute one payload with delivery-count and DLQ handling.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: RenderAdJob,
    ) {
        let job_id = job.job_id.to_string();

        // Poisoned-message guard: messages that keep crashing the processor
        // get parked in the DLQ instead of looping forever.
        let delivery = queue.increment_delivery(&message_id).await.unwrap_or(1);
        if delivery > queue.max_deliveries() {
            warn!(
                "Message for job {} exceeded {} deliveries, moving to DLQ",
                job_id,
                queue.max_deliveries()
            );
            if let Err(e) = queue
                .dlq(&message_id, &job, "max deliveries exceeded")
                .await
            {
                error!("Failed to move job {} to DLQ: {}", job_id, e);
            }
            return;
        }

        info!("Executing job {} (delivery {})", job_id, delivery);

        match run_job(&ctx, &job).await {
            Ok(JobOutcome::RetryStage {
                stage,
                attempt,
                delay,
            }) => {
                let retry = RenderAdJob::retry_stage(
                    job.job_id.clone(),
                    job.version,
                    stage,
                    attempt,
                    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default(),
                );
                match queue.enqueue(&retry).await {
                    Ok(_) => {
                        if let Err(e) = queue.ack(&message_id).await {
                            error!("Failed to ack job {}: {}", job_id, e);
                        }
                    }
                    Err(e) => {
                        // Leave the message pending; visibility-timeout
                        // redelivery becomes the retry transport.
                        error!("Failed to enqueue retry for job {}: {}", job_id, e);
                    }
                }
            }
            Ok(outcome) => {
                debug!("Job {} finished pass with {:?}", job_id, outcome);
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                // Infrastructure error: leave unacked for redelivery.
                error!("Job {} processing error: {}", job_id, e);
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
