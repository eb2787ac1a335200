//! Batch-level result map shared by concurrent file pipelines.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ErrorKind, PipelineError};

/// Final state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Validated output differed from the original and was accepted.
    Updated { repaired: bool, blocks_pruned: usize },
    /// Validated output matched the original; nothing to write.
    Unchanged,
    Failed { kind: ErrorKind, message: String },
}

impl FileOutcome {
    pub fn failed(err: &PipelineError) -> Self {
        Self::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Reading or writing the file failed.
    pub fn io(err: impl fmt::Display) -> Self {
        Self::Failed {
            kind: ErrorKind::Io,
            message: err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.updated + self.unchanged + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} updated, {} unchanged, {} failed",
            self.total(),
            self.updated,
            self.unchanged,
            self.failed
        )
    }
}

/// Path-keyed outcomes behind one async lock.
///
/// Keyed by path, so the order in which tasks finish does not matter. A
/// second record for the same path replaces the first.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    outcomes: Mutex<BTreeMap<PathBuf, FileOutcome>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, path: impl AsRef<Path>, outcome: FileOutcome) {
        self.outcomes
            .lock()
            .await
            .insert(path.as_ref().to_path_buf(), outcome);
    }

    pub async fn get(&self, path: impl AsRef<Path>) -> Option<FileOutcome> {
        self.outcomes.lock().await.get(path.as_ref()).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<PathBuf, FileOutcome> {
        self.outcomes.lock().await.clone()
    }

    pub async fn summary(&self) -> BatchSummary {
        let outcomes = self.outcomes.lock().await;
        let mut summary = BatchSummary::default();
        for outcome in outcomes.values() {
            match outcome {
                FileOutcome::Updated { .. } => summary.updated += 1,
                FileOutcome::Unchanged => summary.unchanged += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}
