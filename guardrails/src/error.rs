//! Error taxonomy for the verified generation pipeline.
//!
//! Two layers:
//!
//! - [`GenerationError`] is produced at the remote-call boundary by a
//!   generator adapter. It is structured data, so the rate-limit classifier
//!   never has to guess from a message when the adapter knows better.
//! - [`PipelineError`] is what the core surfaces to its caller.
//!
//! | Kind                 | Retried | Surfaced                          |
//! |----------------------|---------|-----------------------------------|
//! | RateLimitExhausted   | yes     | only after max attempts           |
//! | AttemptTimeout       | no      | on first occurrence               |
//! | Terminal             | no      | immediately                       |
//! | InvariantViolation   | n/a     | handed to the repair orchestrator |
//! | RepairExhausted      | n/a     | file must stay untouched          |
//! | SyntaxInvalid        | n/a     | counted as a failed repair        |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical status codes carried by structured remote errors.
///
/// Names follow the `google.rpc.Code` spelling used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    ResourceExhausted,
    DeadlineExceeded,
    Unavailable,
    Internal,
    Unknown,
}

impl StatusCode {
    /// Parse a status name such as `"RESOURCE_EXHAUSTED"`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "NOT_FOUND" => Self::NotFound,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "UNAVAILABLE" => Self::Unavailable,
            "INTERNAL" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Best-effort mapping from an HTTP status when the body carries no status name.
    pub fn from_http(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::ResourceExhausted,
            500 => Self::Internal,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single remote generation call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// The adapter already knows this is throttling.
    #[error("rate limited: {message}")]
    RateLimited {
        delay: Option<Duration>,
        message: String,
    },

    /// Structured status returned by the remote service.
    #[error("{code}: {message}")]
    Status {
        code: StatusCode,
        message: String,
        /// Explicit retry delay from the error details, if any.
        retry_delay: Option<Duration>,
    },

    /// The attempt did not complete within its deadline.
    #[error("request timed out after {}", format_duration(.0))]
    Timeout(Duration),

    /// Anything else; only the message is known.
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_delay: None,
        }
    }

    pub fn with_retry_delay(self, delay: Duration) -> Self {
        match self {
            Self::Status { code, message, .. } => Self::Status {
                code,
                message,
                retry_delay: Some(delay),
            },
            Self::RateLimited { message, .. } => Self::RateLimited {
                delay: Some(delay),
                message,
            },
            other => other,
        }
    }
}

/// Why a single repair candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RepairFailure {
    #[error("repair produced empty output")]
    Empty,
    #[error("repair still changed non-comment code:\n{snippet}")]
    StillChanged { snippet: String },
    #[error("repair produced invalid source: {message}")]
    SyntaxInvalid { message: String },
    #[error("repair generation failed: {message}")]
    Generation { message: String },
}

/// Coarse error kind, used for aggregation and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimitExhausted,
    AttemptTimeout,
    Terminal,
    InvariantViolation,
    RepairExhausted,
    SyntaxInvalid,
    /// Reading or writing the file failed outside the pipeline.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimitExhausted => write!(f, "rate_limit_exhausted"),
            Self::AttemptTimeout => write!(f, "attempt_timeout"),
            Self::Terminal => write!(f, "terminal"),
            Self::InvariantViolation => write!(f, "invariant_violation"),
            Self::RepairExhausted => write!(f, "repair_exhausted"),
            Self::SyntaxInvalid => write!(f, "syntax_invalid"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Errors surfaced by the core to the file-pipeline boundary.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("rate limit after {attempts} attempts: {source}")]
    RateLimitExhausted {
        attempts: u32,
        #[source]
        source: GenerationError,
    },

    #[error("request timed out after {}", format_duration(.0))]
    AttemptTimeout(Duration),

    #[error("operation failed: {0}")]
    Terminal(#[source] GenerationError),

    #[error("non-comment code changed:\n{snippet}")]
    InvariantViolation { snippet: String },

    #[error("repair exhausted after {attempts} attempts: {last}")]
    RepairExhausted { attempts: u32, last: RepairFailure },

    #[error("invalid source: {0}")]
    SyntaxInvalid(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            Self::AttemptTimeout(_) => ErrorKind::AttemptTimeout,
            Self::Terminal(_) => ErrorKind::Terminal,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::RepairExhausted { .. } => ErrorKind::RepairExhausted,
            Self::SyntaxInvalid(_) => ErrorKind::SyntaxInvalid,
        }
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
