//! Progress event schema.
//!
//! Events published by the worker over the progress channel and consumed by
//! any live-update transport.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::stage::StageName;

/// Progress event envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Log line for a live console
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage began executing
    StageStarted {
        stage: StageName,
        timestamp: DateTime<Utc>,
    },

    /// Progress update for a stage plus the recomputed overall value
    Progress {
        stage: StageName,
        stage_progress: u8,
        overall: u8,
    },

    /// A stage finished successfully
    StageCompleted { stage: StageName },

    /// The whole job finished; the final video is available
    Completed {
        #[serde(rename = "videoKey")]
        video_key: String,
    },

    /// The job failed at a stage
    Failed {
        stage: StageName,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Create a log event.
    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a stage-started event.
    pub fn stage_started(stage: StageName) -> Self {
        JobEvent::StageStarted {
            stage,
            timestamp: Utc::now(),
        }
    }

    /// Create a progress event.
    pub fn progress(stage: StageName, stage_progress: u8, overall: u8) -> Self {
        JobEvent::Progress {
            stage,
            stage_progress,
            overall,
        }
    }

    /// Create a stage-completed event.
    pub fn stage_completed(stage: StageName) -> Self {
        JobEvent::StageCompleted { stage }
    }

    /// Create a completed event.
    pub fn completed(video_key: impl Into<String>) -> Self {
        JobEvent::Completed {
            video_key: video_key.into(),
        }
    }

    /// Create a failed event with a sanitized message.
    pub fn failed(stage: StageName, message: impl Into<String>) -> Self {
        JobEvent::Failed {
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
