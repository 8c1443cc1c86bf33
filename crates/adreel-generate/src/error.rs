//! Generation client error types.

use thiserror::Error;

pub type GenerateResult<T> = Result<T, GenerateError>;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Generation service returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// Set when the upstream flagged the request as a content-policy
        /// refusal; never retried regardless of status class.
        policy_refusal: bool,
    },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GenerateError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            policy_refusal: false,
        }
    }

    pub fn policy_refusal(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            policy_refusal: true,
        }
    }

    /// Upstream HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GenerateError::Api { status, .. } => Some(*status),
            GenerateError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the upstream signalled a permanent rejection.
    pub fn is_permanent(&self) -> bool {
        match self {
            GenerateError::Api {
                status,
                policy_refusal,
                ..
            } => *policy_refusal || (*status >= 400 && *status < 500),
            GenerateError::Config(_) => true,
            _ => false,
        }
    }

    /// Whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            GenerateError::Timeout(_) => true,
            GenerateError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}
