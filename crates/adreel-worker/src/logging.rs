//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use adreel_models::{JobId, StageName};

/// Job logger with consistent structured fields.
///
/// Carries the job ID and, once processing enters the pipeline, the current
/// stage, so every line of a job's log can be correlated.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: Option<StageName>,
}

impl JobLogger {
    /// Create a logger for a job.
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: None,
        }
    }

    /// Logger scoped to one stage of the job.
    pub fn for_stage(&self, stage: StageName) -> Self {
        Self {
            job_id: self.job_id.clone(),
            stage: Some(stage),
        }
    }

    fn stage_str(&self) -> &str {
        self.stage.map(|s| s.as_str()).unwrap_or("-")
    }

    /// Log the start of an operation.
    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage_str(), "Started: {}", message);
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage_str(), "Progress: {}", message);
    }

    /// Log a warning.
    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage_str(), "Warning: {}", message);
    }

    /// Log an error.
    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage_str(), "Error: {}", message);
    }

    /// Log completion.
    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage_str(), "Completed: {}", message);
    }

    /// Create a tracing span carrying the job/stage fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            stage = %self.stage_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_scoping() {
        let logger = JobLogger::new(&JobId::from_string("j1"));
        assert_eq!(logger.stage_str(), "-");

        let staged = logger.for_stage(StageName::VideoGen);
        assert_eq!(staged.stage_str(), "video_gen");
        // Original is untouched
        assert_eq!(logger.stage_str(), "-");
    }
}
