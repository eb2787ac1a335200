//! Rate-limit classification of generation errors.
//!
//! Structured data wins: an adapter-tagged `RateLimited` or a
//! `RESOURCE_EXHAUSTED` status is trusted as-is. Unstructured errors fall back
//! to message signatures, which is also how an error that merely wraps a
//! throttling response gets recognised.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::DEFAULT_RETRY_DELAY;
use crate::error::{GenerationError, StatusCode};

static RETRY_IN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"retry in ([0-9.]+)s").expect("RETRY_IN_PATTERN regex should compile")
});

/// Message fragments that mark a throttling response.
const RATE_LIMIT_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED", "429", "Quota exceeded"];

/// Result of classifying one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub retryable: bool,
    /// Suggested wait before the next attempt. Zero when not retryable.
    pub delay: Duration,
}

impl RateLimitSignal {
    pub fn retry_after(delay: Duration) -> Self {
        Self {
            retryable: true,
            delay,
        }
    }

    pub fn fatal() -> Self {
        Self {
            retryable: false,
            delay: Duration::ZERO,
        }
    }
}

/// Decides whether an error reflects transient throttling.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitClassifier {
    default_delay: Duration,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl RateLimitClassifier {
    pub fn new(default_delay: Duration) -> Self {
        Self { default_delay }
    }

    pub fn classify(&self, err: &GenerationError) -> RateLimitSignal {
        match err {
            GenerationError::RateLimited { delay, message } => {
                let delay = delay
                    .filter(|d| !d.is_zero())
                    .or_else(|| parse_retry_in(message))
                    .unwrap_or(self.default_delay);
                RateLimitSignal::retry_after(delay)
            }
            GenerationError::Status {
                code: StatusCode::ResourceExhausted,
                message,
                retry_delay,
            } => {
                let delay = retry_delay
                    .filter(|d| !d.is_zero())
                    .or_else(|| parse_retry_in(message))
                    .unwrap_or(self.default_delay);
                RateLimitSignal::retry_after(delay)
            }
            GenerationError::Status { message, .. } | GenerationError::Other(message) => {
                self.classify_message(message)
            }
            // A timeout never carries a throttling signature.
            GenerationError::Timeout(_) => RateLimitSignal::fatal(),
        }
    }

    fn classify_message(&self, message: &str) -> RateLimitSignal {
        if RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
            RateLimitSignal::retry_after(parse_retry_in(message).unwrap_or(self.default_delay))
        } else {
            RateLimitSignal::fatal()
        }
    }
}

/// Extract the `retry in <float>s` hint from a message.
fn parse_retry_in(message: &str) -> Option<Duration> {
    let caps = RETRY_IN_PATTERN.captures(message)?;
    let seconds: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}
