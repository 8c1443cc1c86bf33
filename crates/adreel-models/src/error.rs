//! Pipeline error taxonomy.
//!
//! Every stage fails through one closed set of error kinds carrying a
//! machine-checkable kind, a message produced at the point of failure, and an
//! optional key/value context. Retry classification is a pure function of
//! (kind, context); the user-facing message is a stable sentence per kind and
//! never exposes upstream detail.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Context key: upstream HTTP status code, when known.
pub const CTX_STATUS_CODE: &str = "status_code";
/// Context key: set to "true" when a filesystem failure is transient.
pub const CTX_TRANSIENT: &str = "transient";
/// Context key: set to "true" when the upstream signalled a permanent
/// rejection (e.g. a content-policy refusal).
pub const CTX_PERMANENT: &str = "permanent";
/// Context key: the stage the error was produced in.
pub const CTX_STAGE: &str = "stage";

/// The closed set of pipeline error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; the caller's fault
    Validation,
    /// Upstream generation/storage service failure
    ExternalService,
    /// A produced or supplied file exceeds the allowed size
    FileTooLarge,
    /// Local filesystem failure
    FileSystem,
    /// An operation exceeded its deadline
    Timeout,
    /// Queue infrastructure failure
    Queue,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::ExternalService => "external_service_error",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::FileSystem => "file_system_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Queue => "queue_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pipeline failure: kind, message, context, produced once at the point of
/// failure and propagated unchanged.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize, JsonSchema)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    /// Machine-checkable kind
    pub kind: ErrorKind,
    /// Message captured at the point of failure (logs only, never user-facing)
    pub message: String,
    /// Structured context (status codes, transience markers, stage names)
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl PipelineError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    pub fn file_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileTooLarge, message)
    }

    /// A filesystem failure. `transient` marks causes worth retrying
    /// (interrupted I/O) as opposed to permission or space exhaustion.
    pub fn file_system(message: impl Into<String>, transient: bool) -> Self {
        Self::new(ErrorKind::FileSystem, message)
            .with_context(CTX_TRANSIENT, if transient { "true" } else { "false" })
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Queue, message)
    }

    /// Attach a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach the upstream HTTP status code.
    pub fn with_status(self, status: u16) -> Self {
        self.with_context(CTX_STATUS_CODE, status.to_string())
    }

    /// Mark as a permanent upstream rejection (content policy, bad request).
    pub fn permanent(self) -> Self {
        self.with_context(CTX_PERMANENT, "true")
    }

    /// Attach the stage the error was produced in.
    pub fn in_stage(self, stage: impl fmt::Display) -> Self {
        self.with_context(CTX_STAGE, stage.to_string())
    }

    fn context_is(&self, key: &str, value: &str) -> bool {
        self.context.get(key).map(String::as_str) == Some(value)
    }

    /// Whether the failed operation may be safely re-attempted.
    ///
    /// Pure over (kind, context): 5xx-class and timeout conditions retry;
    /// validation, size-limit, and permanent upstream rejections never do.
    pub fn should_retry(&self) -> bool {
        match self.kind {
            ErrorKind::Validation | ErrorKind::FileTooLarge | ErrorKind::Queue => false,
            ErrorKind::Timeout => true,
            ErrorKind::FileSystem => self.context_is(CTX_TRANSIENT, "true"),
            ErrorKind::ExternalService => {
                if self.context_is(CTX_PERMANENT, "true") {
                    return false;
                }
                match self
                    .context
                    .get(CTX_STATUS_CODE)
                    .and_then(|s| s.parse::<u16>().ok())
                {
                    Some(status) => status >= 500,
                    // No status means a transport-level failure; retry.
                    None => true,
                }
            }
        }
    }

    /// Stable, non-leaking sentence shown to end users.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Validation => "The request contains invalid input, please correct it and try again",
            ErrorKind::ExternalService => "The AI service is temporarily unavailable, please try again",
            ErrorKind::FileTooLarge => "A generated file exceeded the allowed size",
            ErrorKind::FileSystem => "The server could not store the generated assets, please try again",
            ErrorKind::Timeout => "The operation took too long, please try again",
            ErrorKind::Queue => "The job could not be scheduled, please try again later",
        }
    }

    /// Flat body for API responses: kind, sanitized message, context.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind,
            message: self.user_message().to_string(),
            context: self.context.clone(),
        }
    }
}

/// Flat, serializable error body exposed through the API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

/// Exponential backoff policy, independent of error kind.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per stage (including the first)
    pub max_attempts: u32,
    /// Base delay; doubles with each failed attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempting after `attempt` failures (1-based).
    ///
    /// Non-decreasing in attempt number and capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
