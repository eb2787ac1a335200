//! Concurrent batch runner: one guarded pipeline per file.
//!
//! ```text
//! batches (sequential)
//!   └─ files: JoinSet::spawn(process_file) × N, Semaphore-bounded
//!        read → annotate → write-if-changed → aggregator.record
//! ```
//!
//! ## Partial failure policy
//!
//! A failing file is recorded and left untouched on disk; the rest of the
//! batch continues. Cancellation only stops new files from being scheduled;
//! files already in flight run to completion so nothing is half-written.

use std::path::Path;
use std::sync::Arc;

use guardrails::{BatchSummary, FileOutcome, GuardedPipeline, ResultAggregator, SourceLanguage};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompts::comment_request;
use crate::scanner::FileInfo;

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub concurrency: usize,
    /// Run the pipeline but never write.
    pub dry_run: bool,
    /// Rendered context store passed to every prompt as reference.
    pub context: Option<Arc<str>>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            dry_run: false,
            context: None,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub summary: BatchSummary,
    /// Files never scheduled because the run was cancelled.
    pub skipped: usize,
}

pub struct BatchRunner {
    pipeline: GuardedPipeline,
    options: RunnerOptions,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(pipeline: GuardedPipeline, options: RunnerOptions) -> Self {
        Self {
            pipeline,
            options,
            aggregator: Arc::new(ResultAggregator::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn aggregator(&self) -> Arc<ResultAggregator> {
        self.aggregator.clone()
    }

    pub async fn run(&self, files: &[FileInfo]) -> RunReport {
        self.run_batches(&[files.to_vec()]).await
    }

    /// Process batches in order; files within a batch run concurrently.
    pub async fn run_batches(&self, batches: &[Vec<FileInfo>]) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut skipped = 0;

        for (index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                skipped += batch.len();
                continue;
            }
            info!(
                batch = index + 1,
                batches = batches.len(),
                files = batch.len(),
                lines = batch.iter().map(|f| f.lines).sum::<usize>(),
                "starting batch"
            );
            skipped += self.run_one_batch(batch, &semaphore).await;
        }

        let summary = self.aggregator.summary().await;
        info!(%summary, skipped, "run finished");
        RunReport { summary, skipped }
    }

    async fn run_one_batch(&self, batch: &[FileInfo], semaphore: &Arc<Semaphore>) -> usize {
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut skipped = 0;

        for (i, file) in batch.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                skipped = batch.len() - i;
                warn!(skipped, "cancelled, not scheduling remaining files");
                break;
            };

            let pipeline = self.pipeline.clone();
            let aggregator = self.aggregator.clone();
            let context = self.options.context.clone();
            let dry_run = self.options.dry_run;
            let path = file.path.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let outcome = process_file(&pipeline, &path, context.as_deref(), dry_run).await;
                aggregator.record(&path, outcome).await;
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                warn!("file task panicked: {e}");
            }
        }
        skipped
    }
}

/// Run one file through the pipeline. Never writes unless the output is
/// validated and differs from what is on disk.
pub async fn process_file(
    pipeline: &GuardedPipeline,
    path: &Path,
    context: Option<&str>,
    dry_run: bool,
) -> FileOutcome {
    let original = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), "cannot read file: {e}");
            return FileOutcome::io(format!("read {}: {e}", path.display()));
        }
    };
    if original.trim().is_empty() {
        debug!(path = %path.display(), "empty file, skipping");
        return FileOutcome::Unchanged;
    }

    let language = SourceLanguage::from_path(path);
    let request = comment_request(&original, language, context);

    let annotated = match pipeline.annotate(&original, request, language).await {
        Ok(annotated) => annotated,
        Err(e) => {
            warn!(path = %path.display(), kind = %e.kind(), "file left untouched: {e}");
            return FileOutcome::failed(&e);
        }
    };

    if !annotated.differs_from(&original) {
        debug!(path = %path.display(), "no comments added");
        return FileOutcome::Unchanged;
    }

    if dry_run {
        info!(path = %path.display(), repaired = annotated.repaired, "would update (dry run)");
    } else {
        let text = with_trailing_newline(annotated.text.clone(), &original);
        if let Err(e) = tokio::fs::write(path, text).await {
            warn!(path = %path.display(), "write failed: {e}");
            return FileOutcome::io(format!("write {}: {e}", path.display()));
        }
        info!(
            path = %path.display(),
            repaired = annotated.repaired,
            blocks_pruned = annotated.blocks_pruned,
            "updated"
        );
    }

    FileOutcome::Updated {
        repaired: annotated.repaired,
        blocks_pruned: annotated.blocks_pruned,
    }
}

/// Cleanup trims output; keep the original's final newline.
fn with_trailing_newline(mut text: String, original: &str) -> String {
    if original.ends_with('\n') && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_newline_restored() {
        assert_eq!(with_trailing_newline("a".into(), "b\n"), "a\n");
        assert_eq!(with_trailing_newline("a\n".into(), "b\n"), "a\n");
        assert_eq!(with_trailing_newline("a".into(), "b"), "a");
    }

    #[test]
    fn test_default_options() {
        let options = RunnerOptions::default();
        assert!(!options.dry_run);
        assert!(options.concurrency >= 1);
    }
}
