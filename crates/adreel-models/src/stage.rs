//! Pipeline stages and progress computation.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobId;

/// The fixed, ordered set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Generate the ad script and per-scene prompts
    ScriptGen,
    /// Generate the voiceover audio from the script
    VoiceGen,
    /// Generate one video clip per scene prompt
    VideoGen,
    /// Generate the CTA image and compose the final video
    Compositing,
}

impl StageName {
    /// All stages in canonical pipeline order.
    pub const ALL: [StageName; 4] = [
        StageName::ScriptGen,
        StageName::VoiceGen,
        StageName::VideoGen,
        StageName::Compositing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::ScriptGen => "script_gen",
            StageName::VoiceGen => "voice_gen",
            StageName::VideoGen => "video_gen",
            StageName::Compositing => "compositing",
        }
    }

    /// Position in the canonical order.
    pub fn order(&self) -> usize {
        match self {
            StageName::ScriptGen => 0,
            StageName::VoiceGen => 1,
            StageName::VideoGen => 2,
            StageName::Compositing => 3,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<StageName> {
        Self::ALL.get(self.order() + 1).copied()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for its turn in the pipeline
    #[default]
    Pending,
    /// Currently executing
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with a terminal error
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

/// One pipeline step belonging to exactly one job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Stage {
    /// Owning job
    pub job_id: JobId,

    /// Which step this is
    pub name: StageName,

    /// Stage status
    #[serde(default)]
    pub status: StageStatus,

    /// Progress (0-100), monotone while processing
    #[serde(default)]
    pub progress: u8,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Stage-specific output handed to the next stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Sanitized error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Stage {
    /// Create a new pending stage for a job.
    pub fn new(job_id: JobId, name: StageName) -> Self {
        Self {
            job_id,
            name,
            status: StageStatus::Pending,
            progress: 0,
            started_at: None,
            completed_at: None,
            payload: None,
            error_message: None,
        }
    }

    /// Start processing the stage.
    pub fn start(mut self) -> Self {
        self.status = StageStatus::Processing;
        self.started_at = Some(Utc::now());
        self.progress = 0;
        self.error_message = None;
        self
    }

    /// Update progress; never moves backwards while processing.
    pub fn with_progress(mut self, progress: u8) -> Self {
        let progress = progress.min(100);
        if self.status == StageStatus::Processing && progress > self.progress {
            self.progress = progress;
        }
        self
    }

    /// Mark the stage as completed with its output payload.
    pub fn complete(mut self, payload: serde_json::Value) -> Self {
        self.status = StageStatus::Completed;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        self.payload = Some(payload);
        self
    }

    /// Mark the stage as failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = StageStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }

    /// Reset to pending, discarding this attempt's bookkeeping.
    ///
    /// Used when a retryable failure re-enqueues the stage, and when an
    /// edit/retry resets the whole pipeline.
    pub fn reset(mut self) -> Self {
        self.status = StageStatus::Pending;
        self.progress = 0;
        self.started_at = None;
        self.completed_at = None;
        self.payload = None;
        self.error_message = None;
        self
    }
}

/// Sort stages into canonical pipeline order, regardless of insertion order.
pub fn sort_canonical(stages: &mut [Stage]) {
    stages.sort_by_key(|s| s.name.order());
}

/// Overall job progress: floor of the arithmetic mean of stage progress.
///
/// Equal weighting across stages. This is the only place that knows the
/// weighting; revisit here if stages ever get duration-based weights.
pub fn overall_progress(stages: &[Stage]) -> u8 {
    if stages.is_empty() {
        return 0;
    }
    let sum: u32 = stages.iter().map(|s| s.progress as u32).sum();
    (sum / stages.len() as u32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_fixed() {
        let names: Vec<&str> = StageName::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["script_gen", "voice_gen", "video_gen", "compositing"]);
        assert_eq!(StageName::ScriptGen.next(), Some(StageName::VoiceGen));
        assert_eq!(StageName::Compositing.next(), None);
    }

    #[test]
    fn test_sort_canonical_ignores_insertion_order() {
        let job_id = JobId::new();
        let mut stages = vec![
            Stage::new(job_id.clone(), StageName::Compositing),
            Stage::new(job_id.clone(), StageName::ScriptGen),
            Stage::new(job_id.clone(), StageName::VideoGen),
            Stage::new(job_id, StageName::VoiceGen),
        ];
        sort_canonical(&mut stages);
        let names: Vec<StageName> = stages.iter().map(|s| s.name).collect();
        assert_eq!(names.as_slice(), &StageName::ALL);
    }

    #[test]
    fn test_progress_is_monotone_while_processing() {
        let stage = Stage::new(JobId::new(), StageName::VideoGen).start();
        let stage = stage.with_progress(50);
        assert_eq!(stage.progress, 50);
        // Backwards update is ignored
        let stage = stage.with_progress(25);
        assert_eq!(stage.progress, 50);
        let stage = stage.with_progress(200);
        assert_eq!(stage.progress, 100);
    }

    #[test]
    fn test_overall_progress_is_floored_mean() {
        let job_id = JobId::new();
        let mut stages: Vec<Stage> = StageName::ALL
            .iter()
            .map(|n| Stage::new(job_id.clone(), *n))
            .collect();
        assert_eq!(overall_progress(&stages), 0);

        stages[0] = stages[0].clone().start().complete(serde_json::json!({}));
        stages[1] = stages[1].clone().start().with_progress(50);
        // (100 + 50 + 0 + 0) / 4 = 37.5 -> 37
        assert_eq!(overall_progress(&stages), 37);

        for s in stages.iter_mut() {
            *s = s.clone().start().complete(serde_json::json!({}));
        }
        assert_eq!(overall_progress(&stages), 100);
    }
}
