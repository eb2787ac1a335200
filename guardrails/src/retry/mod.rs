//! Bounded remote-call execution.
//!
//! - `classifier`: decides whether an error is transient throttling
//! - `backoff`: jittered sleep before the next attempt
//! - `executor`: the attempt loop itself

pub mod backoff;
pub mod classifier;
pub mod executor;

pub use backoff::{jittered_delay, sleep_with_jitter};
pub use classifier::{RateLimitClassifier, RateLimitSignal};
pub use executor::execute_with_retry;
