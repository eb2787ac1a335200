//! Persistent per-file summaries, keyed by path relative to the project root.
//!
//! Written by `autocomment context`, read by `autocomment gen`, which passes
//! the rendered bundle to every comment prompt as reference material.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the model reported about one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSummary {
    pub path: String,
    pub file_name: String,
    /// Purpose and runtime behaviour in a few sentences.
    pub summary: String,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStore {
    entries: BTreeMap<PathBuf, FileSummary>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a store from disk. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no context store yet");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read context store {}", path.display()))?;
        let entries = serde_json::from_str(&raw)
            .with_context(|| format!("invalid context store {}", path.display()))?;
        Ok(Self { entries })
    }

    /// Write the store as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write context store {}", path.display()))
    }

    /// Store key for `path`: relative to `root` when it lies under it.
    pub fn key_for(root: &Path, path: &Path) -> PathBuf {
        path.strip_prefix(root).unwrap_or(path).to_path_buf()
    }

    pub fn insert(&mut self, key: impl Into<PathBuf>, summary: FileSummary) {
        self.entries.insert(key.into(), summary);
    }

    pub fn get(&self, key: impl AsRef<Path>) -> Option<&FileSummary> {
        self.entries.get(key.as_ref())
    }

    /// Drop entries for files that no longer exist under `root`.
    pub fn retain_existing(&mut self, root: &Path) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| root.join(key).is_file());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One compact JSON object per line, in path order. `None` when empty.
    pub fn render(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .entries
            .values()
            .filter_map(|summary| serde_json::to_string(summary).ok())
            .collect();
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(path: &str) -> FileSummary {
        FileSummary {
            path: path.to_string(),
            file_name: Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            summary: format!("Handles {path}."),
            exports: vec!["Run".into()],
            imports: vec!["fmt".into()],
        }
    }

    #[test]
    fn test_save_then_load_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".autocomment").join("context.json");

        let mut store = ContextStore::new();
        store.insert("cmd/main.go", summary("cmd/main.go"));
        store.insert("src/lib.rs", summary("src/lib.rs"));
        store.save(&path).unwrap();

        let loaded = ContextStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.get("src/lib.rs").unwrap().file_name, "lib.rs");
    }

    #[test]
    fn test_saved_file_is_a_path_keyed_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        let mut store = ContextStore::new();
        store.insert("a.go", summary("a.go"));
        store.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["a.go"]["summary"], "Handles a.go.");
        assert_eq!(raw["a.go"]["exports"][0], "Run");
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.render(), None);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ContextStore::load(&path).is_err());
    }

    #[test]
    fn test_missing_fields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.json");
        std::fs::write(&path, r#"{"a.ts": {"summary": "Adds numbers."}}"#).unwrap();
        let store = ContextStore::load(&path).unwrap();
        let entry = store.get("a.ts").unwrap();
        assert_eq!(entry.summary, "Adds numbers.");
        assert!(entry.exports.is_empty());
    }

    #[test]
    fn test_render_is_one_line_per_file_in_path_order() {
        let mut store = ContextStore::new();
        store.insert("b.go", summary("b.go"));
        store.insert("a.go", summary("a.go"));
        let rendered = store.render().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"path\":\"a.go\""));
        assert!(lines[1].contains("\"path\":\"b.go\""));
    }

    #[test]
    fn test_key_for_strips_root() {
        let root = Path::new("/work/project");
        assert_eq!(
            ContextStore::key_for(root, Path::new("/work/project/src/a.rs")),
            PathBuf::from("src/a.rs")
        );
        assert_eq!(
            ContextStore::key_for(root, Path::new("/elsewhere/b.rs")),
            PathBuf::from("/elsewhere/b.rs")
        );
    }

    #[test]
    fn test_retain_existing_drops_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.go"), "package kept\n").unwrap();
        let mut store = ContextStore::new();
        store.insert("kept.go", summary("kept.go"));
        store.insert("gone.go", summary("gone.go"));

        assert_eq!(store.retain_existing(dir.path()), 1);
        assert!(store.get("kept.go").is_some());
        assert!(store.get("gone.go").is_none());
    }
}
