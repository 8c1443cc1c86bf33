//! Shared data models for the adreel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle records
//! - Pipeline stages and progress computation
//! - Ad briefs (validated job inputs)
//! - Stage payloads handed from one stage to the next
//! - The pipeline error taxonomy and retry policy
//! - Progress event schemas

pub mod brief;
pub mod error;
pub mod event;
pub mod job;
pub mod payload;
pub mod stage;

// Re-export common types
pub use brief::AdBrief;
pub use error::{ErrorBody, ErrorKind, PipelineError, PipelineResult, RetryPolicy};
pub use event::JobEvent;
pub use job::{EditRecord, Job, JobId, JobStatus};
pub use payload::{ComposeOutput, ScriptOutput, VideoOutput, VoiceOutput};
pub use stage::{overall_progress, sort_canonical, Stage, StageName, StageStatus};
