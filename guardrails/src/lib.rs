//! Guardrails for machine-generated source edits
//!
//! This library provides:
//! - A bounded, timeout-aware executor for unreliable, rate-limited remote calls
//! - A comment-only invariant check between an original and a candidate text
//! - A comment-budget pruner that favours declaration docs
//! - A repair orchestrator that retries a stricter generation on violation
//!
//! # Control flow
//!
//! ```text
//! source ─▶ execute_with_retry(generate) ─▶ clean_output ─▶ prune_comments
//!        ─▶ invariant::check ─┬─ unchanged ─▶ accept
//!                             └─ changed ───▶ RepairOrchestrator ─▶ accept | RepairExhausted
//! ```
//!
//! Model access goes through the [`Generator`] trait; this crate does no I/O of
//! its own beyond the calls a generator makes.

#![allow(clippy::uninlined_format_args)]

pub mod aggregate;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod generator;
pub mod invariant;
pub mod pipeline;
pub mod prune;
pub mod repair;
pub mod retry;
pub mod syntax;

pub use aggregate::{BatchSummary, FileOutcome, ResultAggregator};
pub use cleanup::{clean_output, ensure_package_line, strip_code_fences};
pub use config::{GuardConfig, RetryPolicy};
pub use error::{ErrorKind, GenerationError, PipelineError, RepairFailure, StatusCode};
pub use generator::{GenerationRequest, Generator, ModelTier};
pub use invariant::DiffResult;
pub use pipeline::{Annotated, GuardedPipeline};
pub use prune::{prune_comments, prune_with_report, CommentBlock, PruneReport};
pub use repair::{RepairAttempt, RepairOrchestrator, RepairState, RepairVerdict, Verified};
pub use retry::{execute_with_retry, RateLimitClassifier, RateLimitSignal};
pub use syntax::{validate_syntax, SourceLanguage};
