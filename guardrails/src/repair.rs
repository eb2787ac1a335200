//! Repair orchestrator: constrained self-repair after an invariant violation.
//!
//! ```text
//! Generated ──(invariant holds)──────────────────────────────▶ accepted as-is
//!     │
//!     └─(invariant violated)─▶ Violated ─▶ Repairing{1..=max} ─┬─▶ Repaired
//!                                                              └─▶ Exhausted
//! ```
//!
//! Every repair candidate must be non-blank, leave the normalized source
//! identical to the original, and parse in the source grammar. Nothing is
//! written anywhere from here; the caller commits only a returned `Verified`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cleanup::clean_output;
use crate::config::RetryPolicy;
use crate::error::{PipelineError, RepairFailure};
use crate::generator::{GenerationRequest, Generator};
use crate::invariant;
use crate::retry::execute_with_retry;
use crate::syntax::{validate_syntax, SourceLanguage};

/// System instruction for the repair tier.
pub const REPAIR_SYSTEM_INSTRUCTION: &str = "\
You restore source files that an automated commenting pass damaged.

Requirements:
1. Never delete code. Every original function, type, variable, constant and import stays.
2. Only make the small, explicit corrections needed so that the code matches ORIGINAL exactly; comments from CANDIDATE may be kept.
3. Add no new logic, imports, declarations or reordering.
4. The result must parse as valid source in its language.
5. Output only the complete file. No markdown, no fences, no explanation.

If you are not certain a change is safe, return ORIGINAL exactly as given.";

/// States of one repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RepairState {
    Generated,
    Violated,
    Repairing { attempt: u32 },
    Repaired,
    Exhausted,
}

impl fmt::Display for RepairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Violated => write!(f, "violated"),
            Self::Repairing { attempt } => write!(f, "repairing({attempt})"),
            Self::Repaired => write!(f, "repaired"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Repair prompt carrying the original and the violating candidate.
#[derive(Debug, Clone)]
pub struct RepairRequest<'a> {
    pub original: &'a str,
    pub candidate: &'a str,
    pub language: SourceLanguage,
    /// Why the previous repair attempt was rejected, if there was one.
    pub previous_failure: Option<&'a RepairFailure>,
}

impl<'a> RepairRequest<'a> {
    pub fn new(original: &'a str, candidate: &'a str, language: SourceLanguage) -> Self {
        Self {
            original,
            candidate,
            language,
            previous_failure: None,
        }
    }

    pub fn after_failure(mut self, failure: Option<&'a RepairFailure>) -> Self {
        self.previous_failure = failure;
        self
    }

    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "<<<ORIGINAL>>>\n{original}\n<<<CANDIDATE>>>\n{candidate}\n\n\
             Language: {language}\n\n\
             CANDIDATE added comments to ORIGINAL but also altered code. \
             Produce ORIGINAL with only the comments from CANDIDATE applied.\n\
             - Skip any change that requires guessing.\n\
             - Skip any change that could remove working code.\n\
             - Skip any change that would break compilation.\n\
             - If nothing can be applied safely, return ORIGINAL unchanged.\n",
            original = self.original,
            candidate = self.candidate,
            language = self.language,
        );
        if let Some(failure) = self.previous_failure {
            prompt.push_str(&format!(
                "\nThe previous repair was rejected: {failure}\n"
            ));
        }
        prompt.push_str("\nReturn ONLY the complete source file.");
        prompt
    }

    pub fn to_generation_request(&self) -> GenerationRequest {
        GenerationRequest::repair(REPAIR_SYSTEM_INSTRUCTION, self.prompt())
    }
}

/// Verdict on one repair candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RepairVerdict {
    Accepted,
    Rejected { failure: RepairFailure },
}

/// One self-repair round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairAttempt {
    /// 1-indexed.
    pub attempt: u32,
    /// The invariant-violating text this round tried to fix.
    pub input: String,
    /// Cleaned repair output; `None` when generation itself failed.
    pub candidate: Option<String>,
    pub verdict: RepairVerdict,
    pub timestamp: DateTime<Utc>,
}

/// Text that passed verification, possibly after repair.
#[derive(Debug, Clone)]
pub struct Verified {
    pub text: String,
    pub state: RepairState,
    pub attempts: Vec<RepairAttempt>,
}

impl Verified {
    pub fn was_repaired(&self) -> bool {
        self.state == RepairState::Repaired
    }
}

/// Check one repair candidate against the original.
pub fn validate_candidate(
    original: &str,
    candidate: &str,
    language: SourceLanguage,
) -> Result<(), RepairFailure> {
    if candidate.trim().is_empty() {
        return Err(RepairFailure::Empty);
    }

    let diff = invariant::check(original, candidate);
    if diff.changed {
        return Err(RepairFailure::StillChanged {
            snippet: diff.snippet,
        });
    }

    validate_syntax(candidate, language).map_err(|e| RepairFailure::SyntaxInvalid {
        message: e.to_string(),
    })
}

/// Drives secondary generations until one passes or the budget runs out.
#[derive(Clone)]
pub struct RepairOrchestrator {
    generator: Arc<dyn Generator>,
    policy: RetryPolicy,
    language: SourceLanguage,
}

impl RepairOrchestrator {
    pub fn new(generator: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            language: SourceLanguage::Unknown,
        }
    }

    pub fn with_language(mut self, language: SourceLanguage) -> Self {
        self.language = language;
        self
    }

    /// Accept `candidate` if the invariant holds, otherwise try to repair it.
    pub async fn verify_and_repair(
        &self,
        original: &str,
        candidate: &str,
        max_repair_attempts: u32,
    ) -> Result<Verified, PipelineError> {
        let diff = invariant::check(original, candidate);
        if !diff.changed {
            return Ok(Verified {
                text: candidate.to_string(),
                state: RepairState::Generated,
                attempts: Vec::new(),
            });
        }

        warn!(
            language = %self.language,
            "non-comment code changed, starting repair:\n{}",
            diff.snippet
        );
        self.repair(original, candidate, max_repair_attempts).await
    }

    /// Repair a candidate already known to violate the invariant.
    pub async fn repair(
        &self,
        original: &str,
        violating: &str,
        max_repair_attempts: u32,
    ) -> Result<Verified, PipelineError> {
        let mut state = RepairState::Violated;
        let mut attempts = Vec::new();
        let mut last_failure = RepairFailure::StillChanged {
            snippet: invariant::check(original, violating).snippet,
        };

        for attempt in 1..=max_repair_attempts {
            state = transition(state, RepairState::Repairing { attempt });

            let previous = (attempt > 1).then_some(&last_failure);
            let request = RepairRequest::new(original, violating, self.language)
                .after_failure(previous)
                .to_generation_request();

            let (candidate, outcome) = match self.generate(request).await {
                Ok(raw) => {
                    let candidate = clean_output(&raw, original);
                    let outcome = validate_candidate(original, &candidate, self.language);
                    (Some(candidate), outcome)
                }
                Err(e) => (
                    None,
                    Err(RepairFailure::Generation {
                        message: e.to_string(),
                    }),
                ),
            };

            match outcome {
                Ok(()) => {
                    let text = candidate.clone().unwrap_or_default();
                    attempts.push(RepairAttempt {
                        attempt,
                        input: violating.to_string(),
                        candidate,
                        verdict: RepairVerdict::Accepted,
                        timestamp: Utc::now(),
                    });
                    let state = transition(state, RepairState::Repaired);
                    info!(attempt, "repair accepted");
                    return Ok(Verified {
                        text,
                        state,
                        attempts,
                    });
                }
                Err(failure) => {
                    warn!(attempt, max_repair_attempts, reason = %failure, "repair candidate rejected");
                    attempts.push(RepairAttempt {
                        attempt,
                        input: violating.to_string(),
                        candidate,
                        verdict: RepairVerdict::Rejected {
                            failure: failure.clone(),
                        },
                        timestamp: Utc::now(),
                    });
                    last_failure = failure;
                }
            }
        }

        transition(state, RepairState::Exhausted);
        Err(PipelineError::RepairExhausted {
            attempts: max_repair_attempts,
            last: last_failure,
        })
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, PipelineError> {
        let generator = self.generator.clone();
        execute_with_retry(&self.policy, move || {
            let generator = generator.clone();
            let request = request.clone();
            async move { generator.generate(&request).await }
        })
        .await
    }
}

fn transition(from: RepairState, to: RepairState) -> RepairState {
    debug!(%from, %to, "repair state transition");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records the prompts it saw.
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<&str, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::other("script exhausted")))
        }
    }

    const ORIGINAL: &str = "func f(){x:=1; return x}";
    const VIOLATING: &str = "func f(){x:=2; return x} // comment";

    fn orchestrator(generator: Arc<Scripted>) -> RepairOrchestrator {
        RepairOrchestrator::new(generator, RetryPolicy::new(1, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_unchanged_candidate_is_accepted_without_repair() {
        let generator = Scripted::new(vec![]);
        let candidate = "// f returns one.\nfunc f(){x:=1; return x}";
        let verified = orchestrator(generator.clone())
            .verify_and_repair(ORIGINAL, candidate, 2)
            .await
            .unwrap();
        assert_eq!(verified.text, candidate);
        assert_eq!(verified.state, RepairState::Generated);
        assert!(!verified.was_repaired());
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_passing_candidate_wins() {
        let generator = Scripted::new(vec![
            Ok("func f(){x:=1; return x} // comment"),
            Ok("never requested"),
        ]);
        let verified = orchestrator(generator.clone())
            .verify_and_repair(ORIGINAL, VIOLATING, 3)
            .await
            .unwrap();
        assert_eq!(verified.text, "func f(){x:=1; return x} // comment");
        assert!(verified.was_repaired());
        assert_eq!(verified.attempts.len(), 1);
        assert_eq!(generator.calls(), 1);

        let request = &generator.seen.lock().unwrap()[0];
        assert_eq!(request.tier, crate::generator::ModelTier::Repair);
        assert!(request.prompt.contains(ORIGINAL));
        assert!(request.prompt.contains(VIOLATING));
    }

    #[tokio::test]
    async fn test_empty_then_changed_then_exhausted() {
        let generator = Scripted::new(vec![Ok("   \n"), Ok("func f(){x:=3; return x}")]);
        let err = orchestrator(generator.clone())
            .repair(ORIGINAL, VIOLATING, 2)
            .await
            .unwrap_err();

        match err {
            PipelineError::RepairExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, RepairFailure::StillChanged { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(generator.calls(), 2);

        // The second prompt tells the model why the first was rejected.
        let seen = generator.seen.lock().unwrap();
        assert!(!seen[0].prompt.contains("previous repair was rejected"));
        assert!(seen[1].prompt.contains("repair produced empty output"));
    }

    #[tokio::test]
    async fn test_syntax_failure_counts_as_failed_attempt() {
        let original = "package main\n\nvar endpoint = \"http://localhost\"\n";
        // A `//` inside the literal hides the damage from the invariant check.
        let broken = "package main\n\nvar endpoint = \"http://oops\n";
        assert!(!invariant::check(original, broken).changed);
        let generator = Scripted::new(vec![Ok(broken)]);
        let err = RepairOrchestrator::new(generator, RetryPolicy::new(1, Duration::from_secs(5)))
            .with_language(SourceLanguage::Go)
            .repair(original, "package main\nfunc main() {}", 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RepairExhausted {
                last: RepairFailure::SyntaxInvalid { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_generation_error_is_a_failed_attempt() {
        let generator = Scripted::new(vec![
            Err(GenerationError::other("invalid argument")),
            Ok("func f(){x:=1; return x}"),
        ]);
        let verified = orchestrator(generator)
            .repair(ORIGINAL, VIOLATING, 2)
            .await
            .unwrap();
        assert_eq!(verified.attempts.len(), 2);
        assert!(matches!(
            verified.attempts[0].verdict,
            RepairVerdict::Rejected {
                failure: RepairFailure::Generation { .. }
            }
        ));
        assert!(verified.attempts[0].candidate.is_none());
    }

    #[tokio::test]
    async fn test_zero_budget_reports_original_violation() {
        let generator = Scripted::new(vec![]);
        let err = orchestrator(generator.clone())
            .repair(ORIGINAL, VIOLATING, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RepairExhausted {
                attempts: 0,
                last: RepairFailure::StillChanged { .. }
            }
        ));
        assert_eq!(generator.calls(), 0);
    }

    #[test]
    fn test_validate_candidate_checks_in_order() {
        assert_eq!(
            validate_candidate(ORIGINAL, "", SourceLanguage::Unknown),
            Err(RepairFailure::Empty)
        );
        assert!(matches!(
            validate_candidate(ORIGINAL, VIOLATING, SourceLanguage::Unknown),
            Err(RepairFailure::StillChanged { .. })
        ));
        assert_eq!(
            validate_candidate(ORIGINAL, "// ok\nfunc f(){x:=1; return x}", SourceLanguage::Unknown),
            Ok(())
        );
    }
}
