//! Ad generation pipeline worker.
//!
//! This crate provides:
//! - Job intake and edit/retry entry points
//! - The worker executor (dequeue loop, concurrency limit, graceful shutdown)
//! - The stage pipeline state machine (script -> voice -> video -> compositing)
//! - Final video composition behind a trait
//! - Health/selfcheck probes and structured job logging

pub mod compose;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod keys;
pub mod logging;
pub mod processor;
pub mod stages;
pub mod submit;

pub use compose::{ComposeInputs, Composer, FfmpegComposer};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use health::WorkerHealth;
pub use logging::JobLogger;
pub use processor::{run_job, JobOutcome, ProcessingContext};
pub use submit::{prepare_job, prepare_retry, submit_job, retry_job};
