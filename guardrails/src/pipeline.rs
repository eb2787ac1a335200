//! One file's trip through the guarded pipeline:
//! generate → clean → prune → verify → (repair).

use std::sync::Arc;

use tracing::{debug, info};

use crate::cleanup::clean_output;
use crate::config::GuardConfig;
use crate::error::PipelineError;
use crate::generator::{GenerationRequest, Generator};
use crate::prune::prune_with_report;
use crate::repair::{RepairAttempt, RepairOrchestrator, RepairState};
use crate::retry::execute_with_retry;
use crate::syntax::SourceLanguage;

/// Accepted output for one file.
#[derive(Debug, Clone)]
pub struct Annotated {
    pub text: String,
    /// True when the primary output violated the invariant and a repair won.
    pub repaired: bool,
    pub repair_attempts: Vec<RepairAttempt>,
    pub blocks_pruned: usize,
}

impl Annotated {
    /// Whether writing this result would modify `original`.
    pub fn differs_from(&self, original: &str) -> bool {
        self.text.trim_end() != original.trim_end()
    }
}

/// Shared, stateless driver. Clone freely across file tasks.
#[derive(Clone)]
pub struct GuardedPipeline {
    generator: Arc<dyn Generator>,
    config: GuardConfig,
}

impl GuardedPipeline {
    pub fn new(generator: Arc<dyn Generator>, config: GuardConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Generate, clean, prune and verify one file, repairing on violation.
    ///
    /// Pruning runs over the whole output, so when the original already holds
    /// more than `max_comment_blocks` blocks away from declarations, some of
    /// the author's own comments can be dropped. The invariant ignores
    /// comments and still accepts that result.
    pub async fn annotate(
        &self,
        original: &str,
        request: GenerationRequest,
        language: SourceLanguage,
    ) -> Result<Annotated, PipelineError> {
        let policy = self.config.retry_policy();

        let generator = self.generator.clone();
        let raw = execute_with_retry(&policy, move || {
            let generator = generator.clone();
            let request = request.clone();
            async move { generator.generate(&request).await }
        })
        .await?;

        let cleaned = clean_output(&raw, original);
        let report = prune_with_report(&cleaned, self.config.max_comment_blocks);
        let blocks_pruned = report.removed();
        debug!(%language, blocks = report.blocks.len(), blocks_pruned, "primary output cleaned");

        let verified = RepairOrchestrator::new(self.generator.clone(), policy)
            .with_language(language)
            .verify_and_repair(original, &report.text, self.config.max_repair_attempts)
            .await?;

        let repaired = verified.state == RepairState::Repaired;
        if repaired {
            info!(
                %language,
                attempts = verified.attempts.len(),
                "accepted repaired output"
            );
        }

        Ok(Annotated {
            text: verified.text,
            repaired,
            repair_attempts: verified.attempts,
            blocks_pruned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, RepairFailure};
    use crate::generator::ModelTier;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers primary and repair requests from separate fixed replies.
    struct TwoTier {
        primary: String,
        repair: Option<String>,
        repair_calls: Mutex<u32>,
    }

    #[async_trait]
    impl Generator for TwoTier {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            match request.tier {
                ModelTier::Primary => Ok(self.primary.clone()),
                ModelTier::Repair => {
                    *self.repair_calls.lock().unwrap() += 1;
                    self.repair
                        .clone()
                        .ok_or_else(|| GenerationError::other("no repair scripted"))
                }
            }
        }
    }

    fn pipeline(primary: &str, repair: Option<&str>) -> (GuardedPipeline, Arc<TwoTier>) {
        let generator = Arc::new(TwoTier {
            primary: primary.to_string(),
            repair: repair.map(str::to_string),
            repair_calls: Mutex::new(0),
        });
        (
            GuardedPipeline::new(generator.clone(), GuardConfig::default()),
            generator,
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::primary("annotate", "file body")
    }

    #[tokio::test]
    async fn test_comment_only_output_is_accepted() {
        let original = "package main\n\nfunc main() {}\n";
        let (pipeline, generator) =
            pipeline("```go\npackage main\n\n// main runs.\nfunc main() {}\n```", None);

        let annotated = pipeline
            .annotate(original, request(), SourceLanguage::Go)
            .await
            .unwrap();
        assert_eq!(annotated.text, "package main\n\n// main runs.\nfunc main() {}");
        assert!(!annotated.repaired);
        assert!(annotated.differs_from(original));
        assert_eq!(*generator.repair_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_faulty_output_is_repaired() {
        let original = "func f(){x:=1; return x}";
        let (pipeline, generator) = pipeline(
            "func f(){x:=2; return x} // comment",
            Some("func f(){x:=1; return x} // comment"),
        );

        let annotated = pipeline
            .annotate(original, request(), SourceLanguage::Unknown)
            .await
            .unwrap();
        assert_eq!(annotated.text, "func f(){x:=1; return x} // comment");
        assert!(annotated.repaired);
        assert_eq!(annotated.repair_attempts.len(), 1);
        assert_eq!(*generator.repair_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unrepairable_output_is_an_error() {
        let original = "func f(){x:=1; return x}";
        let (pipeline, generator) = pipeline(
            "func f(){x:=2; return x}",
            Some("func f(){x:=3; return x}"),
        );

        let err = pipeline
            .annotate(original, request(), SourceLanguage::Unknown)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RepairExhausted {
                last: RepairFailure::StillChanged { .. },
                ..
            }
        ));
        assert_eq!(
            *generator.repair_calls.lock().unwrap(),
            pipeline.config().max_repair_attempts
        );
    }

    #[tokio::test]
    async fn test_pruning_happens_before_verification() {
        let original = "x := 1\ny := 2\nz := 3";
        let (pipeline, _) = pipeline("x := 1\n// a\ny := 2\n// b\nz := 3", None);
        let pipeline = GuardedPipeline::new(
            pipeline.generator.clone(),
            GuardConfig {
                max_comment_blocks: 1,
                ..GuardConfig::default()
            },
        );

        let annotated = pipeline
            .annotate(original, request(), SourceLanguage::Unknown)
            .await
            .unwrap();
        assert_eq!(annotated.text, "x := 1\n// a\ny := 2\nz := 3");
        assert_eq!(annotated.blocks_pruned, 1);
    }

    #[tokio::test]
    async fn test_doc_test_fences_survive_annotation() {
        let original = "/// ```\n/// assert!(lib::f());\n/// ```\npub fn f() -> bool {\n    true\n}\n";
        let reply = format!("```rust\n// Module summary.\n{original}```");
        let (pipeline, generator) = pipeline(&reply, None);

        let annotated = pipeline
            .annotate(original, request(), SourceLanguage::Rust)
            .await
            .unwrap();
        assert_eq!(
            annotated.text,
            format!("// Module summary.\n{}", original.trim_end())
        );
        assert!(annotated.text.contains("/// ```\n/// assert!(lib::f());\n/// ```"));
        assert!(!annotated.repaired);
        assert_eq!(*generator.repair_calls.lock().unwrap(), 0);
    }
}
