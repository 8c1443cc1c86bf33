//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use adreel_models::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Work directory for per-job asset trees
    pub work_dir: PathBuf,
    /// How long one dequeue poll may block (bounded so shutdown is observed)
    pub consume_block: Duration,
    /// How often the worker scans for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Per-stage retry budget and backoff curve
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/adreel/jobs"),
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/adreel/jobs")),
            consume_block: Duration::from_millis(
                std::env::var("WORKER_CONSUME_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
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
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            retry: RetryPolicy {
                max_attempts: std::env::var("WORKER_MAX_STAGE_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_attempts),
                base_delay: Duration::from_millis(
                    std::env::var("WORKER_RETRY_BASE_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(defaults.base_delay.as_millis() as u64),
                ),
                max_delay: Duration::from_secs(
                    std::env::var("WORKER_RETRY_MAX_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(defaults.max_delay.as_secs()),
                ),
            },
        }
    }
}
