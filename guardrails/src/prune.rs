//! Comment pruner: keeps comment output within a block budget.
//!
//! A comment block is either a run of consecutive `//` lines or one `/* ... */`
//! span. Blocks that sit directly above a declaration are always kept; the
//! rest fill any remaining budget in file order. Non-comment lines are never
//! touched.
//!
//! The budget is a floor on retention, not a ceiling: when declaration-adjacent
//! blocks alone exceed `max_blocks`, none of them are dropped.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Constructs that make a preceding comment worth keeping.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(func|function|fn|type|var|let|const|package|import|export|class|interface|struct|enum|trait|impl|mod|use|pub|static|async|module)\b",
    )
    .expect("DECLARATION regex should compile")
});

/// A contiguous comment region, inclusive on both ends (0-indexed lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentBlock {
    pub start: usize,
    pub end: usize,
    pub keep: bool,
}

impl CommentBlock {
    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Result of one pruning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub text: String,
    pub blocks: Vec<CommentBlock>,
}

impl PruneReport {
    pub fn kept(&self) -> usize {
        self.blocks.iter().filter(|b| b.keep).count()
    }

    pub fn removed(&self) -> usize {
        self.blocks.len() - self.kept()
    }
}

/// Prune `source` down to roughly `max_blocks` comment blocks.
pub fn prune_comments(source: &str, max_blocks: usize) -> String {
    prune_with_report(source, max_blocks).text
}

/// Like [`prune_comments`] but also returns the block decisions.
pub fn prune_with_report(source: &str, max_blocks: usize) -> PruneReport {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut blocks = find_blocks(&lines);

    for block in blocks.iter_mut() {
        block.keep = precedes_declaration(&lines, block.end);
    }

    let mut kept = blocks.iter().filter(|b| b.keep).count();
    for block in blocks.iter_mut() {
        if kept >= max_blocks {
            break;
        }
        if !block.keep {
            block.keep = true;
            kept += 1;
        }
    }

    let skip: HashSet<usize> = blocks
        .iter()
        .filter(|b| !b.keep)
        .flat_map(|b| b.start..=b.end)
        .collect();

    let text = lines
        .iter()
        .enumerate()
        .filter(|(idx, _)| !skip.contains(idx))
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");

    debug!(
        blocks = blocks.len(),
        kept,
        max_blocks,
        lines_removed = skip.len(),
        "pruned comment blocks"
    );

    PruneReport { text, blocks }
}

/// Scan lines for comment blocks in file order.
pub fn find_blocks(lines: &[&str]) -> Vec<CommentBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        let end = if line.starts_with("/*") {
            // Runs to the line holding the closing marker, or end of input.
            (i..lines.len())
                .find(|&j| lines[j].contains("*/"))
                .unwrap_or(lines.len() - 1)
        } else if line.starts_with("//") {
            (i + 1..lines.len())
                .find(|&j| !lines[j].trim().starts_with("//"))
                .map_or(lines.len() - 1, |j| j - 1)
        } else {
            i += 1;
            continue;
        };

        blocks.push(CommentBlock {
            start: i,
            end,
            keep: false,
        });
        i = end + 1;
    }

    blocks
}

/// Whether the first non-blank line after `end` opens a declaration.
fn precedes_declaration(lines: &[&str], end: usize) -> bool {
    lines
        .iter()
        .skip(end + 1)
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| DECLARATION.is_match(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_comment_lines(text: &str) -> usize {
        text.lines().filter(|l| l.trim().starts_with("//")).count()
    }

    #[test]
    fn test_finds_line_runs_and_block_spans() {
        let src = "// a\n// b\nx := 1\n/* c\n d */\ny := 2\n// e";
        let lines: Vec<&str> = src.split('\n').collect();
        let blocks = find_blocks(&lines);
        assert_eq!(
            blocks.iter().map(|b| (b.start, b.end)).collect::<Vec<_>>(),
            vec![(0, 1), (3, 4), (6, 6)]
        );
    }

    #[test]
    fn test_single_line_block_comment() {
        let lines = vec!["/* one */", "x := 1"];
        let blocks = find_blocks(&lines);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start, blocks[0].end), (0, 0));
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        let lines = vec!["x", "/* open", "still open"];
        let blocks = find_blocks(&lines);
        assert_eq!((blocks[0].start, blocks[0].end), (1, 2));
    }

    #[test]
    fn test_trailing_comments_are_not_blocks() {
        let lines = vec!["x := 1 // note", "y := 2"];
        assert!(find_blocks(&lines).is_empty());
    }

    #[test]
    fn test_declaration_adjacent_blocks_exceed_budget() {
        let mut src = String::from("package main\n");
        for i in 0..10 {
            src.push_str(&format!("\n// f{i} does things.\nfunc f{i}() {{}}\n"));
        }
        let report = prune_with_report(&src, 5);
        assert_eq!(report.blocks.len(), 10);
        assert_eq!(report.kept(), 10);
        assert_eq!(report.text, src);
    }

    #[test]
    fn test_fills_budget_in_file_order() {
        let mut src = String::from("package main\n\n// Add adds.\nfunc Add() {}\n\n// Sub subtracts.\nfunc Sub() {}\n\nfunc body() {\n");
        for i in 0..8 {
            src.push_str(&format!("\t// step {i}\n\tx{i} := {i}\n"));
        }
        src.push_str("}\n");

        let out = prune_comments(&src, 5);
        assert_eq!(count_comment_lines(&out), 5);
        assert!(out.contains("// Add adds."));
        assert!(out.contains("// Sub subtracts."));
        for i in 0..3 {
            assert!(out.contains(&format!("// step {i}")));
        }
        for i in 3..8 {
            assert!(!out.contains(&format!("// step {i}")));
        }
        // Code lines survive untouched and in order.
        for i in 0..8 {
            assert!(out.contains(&format!("\tx{i} := {i}")));
        }
    }

    #[test]
    fn test_blank_lines_between_comment_and_declaration() {
        let src = "// Doc for T.\n\n\ntype T struct{}\n\nfunc f() {\n\t// inner\n\tx := 1\n}";
        let out = prune_comments(src, 0);
        assert!(out.contains("// Doc for T."));
        assert!(!out.contains("// inner"));
    }

    #[test]
    fn test_zero_budget_drops_every_plain_block() {
        let src = "x := 1\n// a\ny := 2\n/* b */\nz := 3";
        assert_eq!(prune_comments(src, 0), "x := 1\ny := 2\nz := 3");
    }

    #[test]
    fn test_no_comments_is_identity() {
        let src = "package main\n\nfunc main() {}\n";
        assert_eq!(prune_comments(src, 3), src);
    }

    #[test]
    fn test_recognises_typescript_and_rust_declarations() {
        let src = "// exported\nexport function f() {}\n// rust fn\npub fn g() {}\n// misc\nfoo();";
        let report = prune_with_report(src, 0);
        let keeps: Vec<bool> = report.blocks.iter().map(|b| b.keep).collect();
        assert_eq!(keeps, vec![true, true, false]);
        assert_eq!(report.removed(), 1);
    }
}
