//! Job lifecycle records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::brief::AdBrief;
use crate::stage::StageName;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue
    #[default]
    Pending,
    /// Job is being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One entry in a job's edit history.
///
/// Appended every time a terminal job is reset for edit/retry; the version
/// recorded is the version that was superseded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EditRecord {
    /// Operation that triggered the reset (e.g. "retry", "edit_brief")
    pub operation: String,
    /// Version superseded by this operation
    pub superseded_version: u32,
    /// When the operation happened
    pub at: DateTime<Utc>,
}

/// One end-to-end ad-generation request and its lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job status
    #[serde(default)]
    pub status: JobStatus,

    /// Input parameters
    pub brief: AdBrief,

    /// Remote reference to the final composed video (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_video: Option<String>,

    /// Accumulated generation cost across all stages and attempts
    #[serde(default)]
    pub cost: f64,

    /// Sanitized error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Stage that caused the failure (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageName>,

    /// Version, incremented on every edit/retry reset
    #[serde(default = "default_version")]
    pub version: u32,

    /// Ordered history of past edit/retry operations
    #[serde(default)]
    pub edit_history: Vec<EditRecord>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    1
}

impl Job {
    /// Create a new pending job for the given brief.
    pub fn new(brief: AdBrief) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            brief,
            output_video: None,
            cost: 0.0,
            error_message: None,
            failed_stage: None,
            version: default_version(),
            edit_history: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Start processing the job.
    pub fn start(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as completed with its output video reference.
    pub fn complete(mut self, output_video: impl Into<String>) -> Self {
        self.status = JobStatus::Completed;
        self.output_video = Some(output_video.into());
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Mark job as failed at the given stage with a sanitized message.
    pub fn fail(mut self, stage: StageName, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.failed_stage = Some(stage);
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        self
    }

    /// Accumulate generation cost.
    pub fn add_cost(mut self, cost: f64) -> Self {
        self.cost += cost;
        self.updated_at = Utc::now();
        self
    }

    /// Reset a terminal job back to pending for edit/retry.
    ///
    /// The only backward transition in the state machine: bumps the version,
    /// records the superseded one in the edit history, and clears the
    /// per-attempt output and error fields. Accumulated cost is kept.
    pub fn reset_for_retry(mut self, operation: impl Into<String>) -> Self {
        self.edit_history.push(EditRecord {
            operation: operation.into(),
            superseded_version: self.version,
            at: Utc::now(),
        });
        self.version += 1;
        self.status = JobStatus::Pending;
        self.output_video = None;
        self.error_message = None;
        self.failed_stage = None;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
        self
    }
}
