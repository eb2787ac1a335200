//! Jittered backoff. Each sleep blocks only the calling task.

use std::time::Duration;

use rand::Rng;

/// Base delay plus uniform jitter in `[0, base / 2)`.
///
/// A zero base is replaced by `default_delay`.
pub fn jittered_delay(base: Duration, default_delay: Duration) -> Duration {
    let base = if base.is_zero() { default_delay } else { base };
    let half_nanos = (base.as_nanos() / 2).min(u64::MAX as u128) as u64;
    if half_nanos == 0 {
        return base;
    }
    let jitter = rand::rng().random_range(0..half_nanos);
    base + Duration::from_nanos(jitter)
}

/// Sleep for a jittered delay and return how long was slept.
pub async fn sleep_with_jitter(base: Duration, default_delay: Duration) -> Duration {
    let delay = jittered_delay(base, default_delay);
    tokio::time::sleep(delay).await;
    delay
}
