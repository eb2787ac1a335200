//! Syntax validation with tree-sitter.
//!
//! Repair candidates are parsed in their own grammar before acceptance. A
//! candidate can pass the invariant check and still fail to parse, for
//! example when a comment marker lands inside a string literal.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Parser};

use crate::error::PipelineError;

/// Languages the pipeline knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLanguage {
    Go,
    Rust,
    TypeScript,
    Tsx,
    JavaScript,
    /// No parser available; syntax checks always pass.
    Unknown,
}

impl SourceLanguage {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "go" => Self::Go,
            "rs" => Self::Rust,
            "ts" | "mts" | "cts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    fn grammar(self) -> Option<Language> {
        match self {
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Go => write!(f, "go"),
            Self::Rust => write!(f, "rust"),
            Self::TypeScript => write!(f, "typescript"),
            Self::Tsx => write!(f, "tsx"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parse `source` and reject it if the tree contains error or missing nodes.
pub fn validate_syntax(source: &str, language: SourceLanguage) -> Result<(), PipelineError> {
    let Some(grammar) = language.grammar() else {
        return Ok(());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| PipelineError::SyntaxInvalid(format!("{language} grammar unavailable: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| PipelineError::SyntaxInvalid(format!("{language} parser returned no tree")))?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }

    let line = first_error_line(root).map_or_else(String::new, |l| format!(" near line {}", l + 1));
    Err(PipelineError::SyntaxInvalid(format!(
        "{language} source does not parse{line}"
    )))
}

/// Row of the first error or missing node, depth-first.
fn first_error_line(node: tree_sitter::Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error_line)
}
