//! Error types for the operation router

use std::io;

use thiserror::Error;

use crate::query::QueryError;

/// Result type alias for the operation router
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of upstream body characters carried in an error
const BODY_EXCERPT_CHARS: usize = 500;

/// Operation router errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or construction error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation name not present in the effective registry
    #[error("unknown operation '{operation}'. Available operations include: {}", available.join(", "))]
    UnknownOperation {
        /// Canonical operation name that was looked up
        operation: String,
        /// Up to ten known operation names, as a hint
        available: Vec<String>,
    },

    /// Required parameter absent from the call
    #[error("operation '{operation}' requires parameter '{parameter}'")]
    MissingParameter {
        /// Operation being invoked
        operation: String,
        /// Name of the missing parameter
        parameter: String,
    },

    /// Parameter present but unusable
    #[error("invalid parameters for '{operation}': {message}")]
    InvalidParameter {
        /// Operation being invoked
        operation: String,
        /// What is wrong
        message: String,
    },

    /// Query-language construction or validation failure
    #[error("invalid AQL query: {0}")]
    Query(#[from] QueryError),

    /// No usable credentials for the configured auth type
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout or deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Caller cancelled the call
    #[error("operation cancelled")]
    Cancelled,

    /// Local rate limiter refused the request
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Non-2xx response after retries were exhausted
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream {
        /// Last observed status
        status: u16,
        /// Body excerpt
        body: String,
    },

    /// Identity or profile discovery failed
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Downloaded content does not match the expected digest
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected hex digest
        expected: String,
        /// Computed hex digest
        actual: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build an upstream error, truncating the body to avoid leaking large payloads
    pub fn upstream(status: u16, body: &str) -> Self {
        Self::Upstream {
            status,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        }
    }

    /// Whether the failure is transient and worth another attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Http(_) | Self::Io(_) => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the caller can fix this by changing the request
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperation { .. }
                | Self::MissingParameter { .. }
                | Self::InvalidParameter { .. }
                | Self::Query(_)
        )
    }

    /// Upstream status code, when the error carries one
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
