//! Attempt controller: bounded, timeout-aware execution with rate-limit backoff.
//!
//! ```text
//! attempt 1..=max
//!   spawn unit ──┬─ Ok(v)                      → return v
//!                ├─ Err(e), retryable, left    → jittered sleep, next attempt
//!                ├─ Err(e), retryable, last    → RateLimitExhausted
//!                ├─ Err(e), not retryable      → Terminal
//!                └─ deadline elapsed           → abort task, AttemptTimeout
//! ```
//!
//! Attempts are strictly sequential. Each one runs as its own tokio task so
//! the deadline can fire while the unit is blocked on I/O. On timeout the task
//! is aborted; cancellation is cooperative, so it stops at its next `.await`.

use std::future::Future;

use tracing::{debug, warn};

use super::backoff::sleep_with_jitter;
use super::classifier::RateLimitClassifier;
use crate::config::RetryPolicy;
use crate::error::{GenerationError, PipelineError};

/// Run `unit` until it succeeds, fails terminally, times out, or the attempt
/// budget is spent.
///
/// `unit` is invoked once per attempt and never more than
/// `policy.max_attempts` times.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut unit: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>> + Send + 'static,
    T: Send + 'static,
{
    let classifier = RateLimitClassifier::new(policy.default_delay);
    let max_attempts = policy.effective_attempts();

    let mut attempt = 0;
    loop {
        attempt += 1;
        let handle = tokio::spawn(unit());
        let abort = handle.abort_handle();

        let err = match tokio::time::timeout(policy.attempt_timeout, handle).await {
            Ok(Ok(Ok(value))) => {
                debug!(attempt, "generation attempt succeeded");
                return Ok(value);
            }
            Ok(Ok(Err(err))) => err,
            Ok(Err(join_err)) => {
                GenerationError::other(format!("generation task failed: {join_err}"))
            }
            Err(_) => {
                abort.abort();
                GenerationError::Timeout(policy.attempt_timeout)
            }
        };

        let signal = classifier.classify(&err);
        if !signal.retryable {
            warn!(attempt, error = %err, "generation attempt failed, not retrying");
            return Err(match err {
                GenerationError::Timeout(after) => PipelineError::AttemptTimeout(after),
                other => PipelineError::Terminal(other),
            });
        }

        if attempt == max_attempts {
            warn!(attempt, max_attempts, error = %err, "rate limit persisted through every attempt");
            return Err(PipelineError::RateLimitExhausted {
                attempts: max_attempts,
                source: err,
            });
        }

        let slept = sleep_with_jitter(signal.delay, policy.default_delay).await;
        warn!(
            attempt,
            max_attempts,
            delay_ms = slept.as_millis() as u64,
            error = %err,
            "rate limited, retrying"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1))
            .with_default_delay(Duration::from_millis(100))
    }

    type BoxedAttempt<T> = Pin<Box<dyn Future<Output = Result<T, GenerationError>> + Send>>;

    fn counting<T, F>(calls: &Arc<AtomicU32>, mut f: F) -> impl FnMut() -> BoxedAttempt<T>
    where
        F: FnMut(u32) -> Result<T, GenerationError>,
        T: Send + 'static,
    {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result = f(n);
            Box::pin(async move { result })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let out = execute_with_retry(&policy(3), counting(&calls, |_| Ok("done"))).await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let out: Result<(), _> = execute_with_retry(
            &policy(3),
            counting(&calls, |_| Err(GenerationError::other("429 Too Many Requests"))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = out.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimitExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let out = execute_with_retry(
            &policy(3),
            counting(&calls, |n| {
                if n < 3 {
                    Err(GenerationError::status(StatusCode::ResourceExhausted, "quota"))
                } else {
                    Ok(n)
                }
            }),
        )
        .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let out: Result<(), _> = execute_with_retry(
            &policy(5),
            counting(&calls, |_| Err(GenerationError::other("invalid argument: missing field"))),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(out.unwrap_err(), PipelineError::Terminal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let out: Result<(), _> = execute_with_retry(&policy(3), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = out.unwrap_err();
        assert!(matches!(err, PipelineError::AttemptTimeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_unit_is_terminal() {
        let out: Result<(), _> = execute_with_retry(&policy(3), || async {
            if true {
                panic!("generator exploded");
            }
            Ok(())
        })
        .await;
        assert!(matches!(out.unwrap_err(), PipelineError::Terminal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_at_least_the_hinted_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();
        let _ = execute_with_retry(
            &policy(2),
            counting(&calls, |n| {
                if n == 1 {
                    Err(GenerationError::other("RESOURCE_EXHAUSTED retry in 2s"))
                } else {
                    Ok(())
                }
            }),
        )
        .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }
}
