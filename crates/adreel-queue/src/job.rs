//! Queue payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adreel_models::{JobId, StageName};

/// Payload delivered to the worker: render one ad job, optionally resuming
/// at a specific stage after a retryable failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderAdJob {
    /// Job to render
    pub job_id: JobId,
    /// Job version this payload belongs to; stale payloads from before an
    /// edit/retry reset are dropped on dequeue
    pub version: u32,
    /// Stage to resume from; `None` starts at the first pending stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<StageName>,
    /// Attempt number for the resume stage (1-based)
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    /// Earliest time the payload should be processed (stage retry backoff)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    /// When the payload was created
    pub created_at: DateTime<Utc>,
}

fn default_attempt() -> u32 {
    1
}

impl RenderAdJob {
    /// Initial payload for a freshly-submitted (or reset) job.
    pub fn new(job_id: JobId, version: u32) -> Self {
        Self {
            job_id,
            version,
            resume_from: None,
            attempt: 1,
            not_before: None,
            created_at: Utc::now(),
        }
    }

    /// Payload re-enqueueing the same stage after a retryable failure.
    pub fn retry_stage(
        job_id: JobId,
        version: u32,
        stage: StageName,
        attempt: u32,
        not_before: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            version,
            resume_from: Some(stage),
            attempt,
            not_before: Some(not_before),
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication.
    ///
    /// Distinct per (job, version, resume point, attempt) so a stage retry
    /// is never deduplicated against the original enqueue.
    pub fn idempotency_key(&self) -> String {
        let stage = self.resume_from.map(|s| s.as_str()).unwrap_or("start");
        format!("render:{}:{}:{}:{}", self.job_id, self.version, stage, self.attempt)
    }
}
