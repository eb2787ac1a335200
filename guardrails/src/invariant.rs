//! Invariant checker: only comments and blank lines may differ.
//!
//! Both texts are normalized independently (block comments, then line
//! comments, then blank lines removed; surviving lines trimmed) and compared
//! byte for byte. This is a textual check. It does not understand reordering
//! of equivalent statements.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("BLOCK_COMMENT regex should compile"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//.*").expect("LINE_COMMENT regex should compile"));

/// Characters of context kept on each side of the first divergence.
pub const SNIPPET_CONTEXT: usize = 40;

/// Outcome of comparing an original text with a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub changed: bool,
    /// Bounded window around the first divergence; empty when unchanged.
    pub snippet: String,
}

impl DiffResult {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Strip comments and blank lines, trimming what remains.
pub fn normalize(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(source, "");
    let without_lines = LINE_COMMENT.replace_all(&without_blocks, "");
    without_lines
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Report whether non-comment content differs between `original` and `candidate`.
pub fn check(original: &str, candidate: &str) -> DiffResult {
    let a = normalize(original);
    let b = normalize(candidate);

    if a == b {
        return DiffResult::unchanged();
    }

    let idx = a
        .bytes()
        .zip(b.bytes())
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()));

    let start = idx.saturating_sub(SNIPPET_CONTEXT);
    let snippet = format!(
        "orig...({})\n\nnew...({})",
        window(&a, start, idx + SNIPPET_CONTEXT),
        window(&b, start, idx + SNIPPET_CONTEXT),
    );

    DiffResult {
        changed: true,
        snippet,
    }
}

/// Convenience form returning `(changed, snippet)`.
pub fn changed(original: &str, candidate: &str) -> (bool, String) {
    let DiffResult { changed, snippet } = check(original, candidate);
    (changed, snippet)
}

/// Byte window clipped to bounds and widened to char boundaries.
fn window(s: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(s.len());
    while !s.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = end.min(s.len()).max(start);
    while !s.is_char_boundary(end) {
        end += 1;
    }
    &s[start..end]
}
