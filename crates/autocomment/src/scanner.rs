//! Source discovery: `.gitignore`-respecting walk, filtering, and batching.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Directory names never descended into.
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    "build",
    "dist",
    "migrations",
    "prisma",
    "vendor",
    "target",
];

/// Extensions the pipeline can verify.
pub const ALLOWED_EXTENSIONS: &[&str] = &["go", "rs", "ts", "tsx", "js", "jsx"];

/// Path fragments marking generated, vendored, or test-only code.
const SKIP_FRAGMENTS: &[&str] = &["/ui/", "/types/", "/__tests__/", "/.storybook/", "seed."];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub lines: usize,
    pub size: u64,
}

/// Every allowed source file under `root`, sorted by path.
pub fn scan(root: impl AsRef<Path>) -> Result<Vec<FileInfo>> {
    let root = root.as_ref();
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot scan {}", root.display()))?;

    let walker = WalkBuilder::new(&root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && SKIP_DIRS.iter().any(|d| entry.file_name() == *d))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("walk error: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !has_allowed_extension(path) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };

        files.push(FileInfo {
            path: path.to_path_buf(),
            name: entry.file_name().to_string_lossy().into_owned(),
            lines: count_lines(path),
            size: meta.len(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e))
}

/// Unreadable files count as zero lines.
fn count_lines(path: &Path) -> usize {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => 0,
        Ok(bytes) => {
            let newlines = bytes.iter().filter(|b| **b == b'\n').count();
            if bytes.ends_with(b"\n") {
                newlines
            } else {
                newlines + 1
            }
        }
        Err(_) => 0,
    }
}

/// Drop declaration stubs, UI kits, tests, framework config and seed data.
pub fn filter_comment_worthy(files: Vec<FileInfo>) -> Vec<FileInfo> {
    files
        .into_iter()
        .filter(|f| {
            let path = f.path.to_string_lossy().replace('\\', "/");
            if path.ends_with(".d.ts") {
                return false;
            }
            if SKIP_FRAGMENTS.iter().any(|frag| path.contains(frag)) {
                return false;
            }
            !(f.name.starts_with("next-env.d.ts") || f.name.starts_with("next.config"))
        })
        .collect()
}

/// Group files greedily so each batch stays within `max_lines` where possible.
///
/// A single file larger than the budget gets a batch of its own.
pub fn batch_by_lines(files: &[FileInfo], max_lines: usize) -> Vec<Vec<FileInfo>> {
    let mut batches = Vec::new();
    let mut group: Vec<FileInfo> = Vec::new();
    let mut used = 0;

    for file in files {
        if used + file.lines > max_lines && !group.is_empty() {
            batches.push(std::mem::take(&mut group));
            used = 0;
        }
        group.push(file.clone());
        used += file.lines;
    }
    if !group.is_empty() {
        batches.push(group);
    }
    batches
}
