//! Per-file summaries for the context store.
//!
//! Each file is one `execute_with_retry` call on the primary tier, so
//! summaries get the same deadline and rate-limit handling as comment
//! generation. Files run concurrently within a batch, bounded by a
//! `Semaphore`; a file that fails is logged and left out of the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use guardrails::{
    execute_with_retry, strip_code_fences, Generator, PipelineError, RetryPolicy, SourceLanguage,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context_store::{ContextStore, FileSummary};
use crate::prompts::context_request;
use crate::scanner::FileInfo;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Generation(#[from] PipelineError),
    #[error("reply is not a summary object: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What a context run did.
#[derive(Debug, Default)]
pub struct ContextReport {
    pub summarized: usize,
    pub failed: Vec<(PathBuf, String)>,
    /// Files never scheduled because the run was cancelled.
    pub skipped: usize,
}

pub struct ContextBuilder {
    generator: Arc<dyn Generator>,
    policy: RetryPolicy,
    concurrency: usize,
    cancel: CancellationToken,
}

impl ContextBuilder {
    pub fn new(generator: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Summarise every file and insert the results into `store`, keyed
    /// relative to `root`. Existing entries for other files are kept.
    pub async fn build(
        &self,
        root: &Path,
        batches: &[Vec<FileInfo>],
        store: &mut ContextStore,
    ) -> ContextReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut report = ContextReport::default();

        for (index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.skipped += batch.len();
                continue;
            }
            info!(
                batch = index + 1,
                batches = batches.len(),
                files = batch.len(),
                "summarising batch"
            );

            let mut join_set = JoinSet::new();
            for (i, file) in batch.iter().enumerate() {
                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    permit = semaphore.clone().acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    report.skipped += batch.len() - i;
                    warn!("cancelled, not summarising remaining files");
                    break;
                };

                let generator = self.generator.clone();
                let policy = self.policy;
                let key = ContextStore::key_for(root, &file.path);
                let path = file.path.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    let result = summarize_file(generator, &policy, &key, &path).await;
                    (key, result)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((key, Ok(summary))) => {
                        debug!(path = %key.display(), "summarised");
                        store.insert(key, summary);
                        report.summarized += 1;
                    }
                    Ok((key, Err(e))) => {
                        warn!(path = %key.display(), "summary failed: {e}");
                        report.failed.push((key, e.to_string()));
                    }
                    Err(e) => warn!("summary task panicked: {e}"),
                }
            }
        }

        report.failed.sort();
        info!(
            summarized = report.summarized,
            failed = report.failed.len(),
            skipped = report.skipped,
            "context run finished"
        );
        report
    }
}

/// Ask the model about one file. `key` is the path recorded in the summary.
pub async fn summarize_file(
    generator: Arc<dyn Generator>,
    policy: &RetryPolicy,
    key: &Path,
    path: &Path,
) -> Result<FileSummary, SummaryError> {
    let content = tokio::fs::read_to_string(path).await?;
    let display_key = key.to_string_lossy().into_owned();
    let request = context_request(&display_key, &content, SourceLanguage::from_path(path));

    let raw = execute_with_retry(policy, move || {
        let generator = generator.clone();
        let request = request.clone();
        async move { generator.generate(&request).await }
    })
    .await?;

    let mut summary = parse_summary(&raw)?;
    summary.path = display_key;
    summary.file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(summary)
}

/// Parse a summary reply, tolerating a fence or chatter around the object.
pub fn parse_summary(raw: &str) -> Result<FileSummary, serde_json::Error> {
    let text = strip_code_fences(raw);
    let object = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.as_str(),
    };
    serde_json::from_str(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let summary = parse_summary(
            r#"{"path":"a.go","file_name":"a.go","summary":"Entry point.","exports":["Run"],"imports":["fmt"]}"#,
        )
        .unwrap();
        assert_eq!(summary.summary, "Entry point.");
        assert_eq!(summary.exports, vec!["Run"]);
    }

    #[test]
    fn test_parse_fenced_object_with_chatter() {
        let raw = "```json\nHere you go: {\"summary\": \"Loads config.\"}\n```";
        assert_eq!(parse_summary(raw).unwrap().summary, "Loads config.");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_summary("I could not read this file.").is_err());
    }
}
