//! Tunables for the guarded generation pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay used when a throttling error carries no usable retry hint.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Attempts per generation call, including the first.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;
/// Deadline for one generation attempt.
pub const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Comment blocks the pruner aims to retain.
pub const MAX_COMMENT_BLOCKS: usize = 40;
/// Secondary generations tried after an invariant violation.
pub const MAX_REPAIR_ATTEMPTS: u32 = 2;

/// Guard configuration. Every field has a serde default so partial TOML
/// tables deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Fallback backoff base in milliseconds.
    pub default_retry_delay_ms: u64,
    pub max_retry_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub max_comment_blocks: usize,
    pub max_repair_attempts: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            default_retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            attempt_timeout_secs: PER_ATTEMPT_TIMEOUT.as_secs(),
            max_comment_blocks: MAX_COMMENT_BLOCKS,
            max_repair_attempts: MAX_REPAIR_ATTEMPTS,
        }
    }
}

impl GuardConfig {
    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Attempt-controller policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            attempt_timeout: self.attempt_timeout(),
            default_delay: self.default_retry_delay(),
        }
    }
}

/// Bounds for one `execute_with_retry` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        GuardConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            attempt_timeout,
            default_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub(crate) fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}
