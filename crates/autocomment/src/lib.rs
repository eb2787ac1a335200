//! autocomment: add high-value comments to a source tree without letting a
//! model touch the code.
//!
//! Collaborators around the `guardrails` core:
//! - `config`: TOML file, environment overrides, defaults
//! - `provider`: Gemini `generateContent` adapter
//! - `prompts`: commenting and summary instructions
//! - `scanner`: file discovery, filtering, line batching
//! - `runner`: concurrent per-file pipelines with a shared result map
//! - `context_store`, `summarizer`: per-file summaries fed back into prompts

pub mod config;
pub mod context_store;
pub mod prompts;
pub mod provider;
pub mod runner;
pub mod scanner;
pub mod summarizer;

pub use config::AppConfig;
pub use context_store::{ContextStore, FileSummary};
pub use provider::GeminiGenerator;
pub use runner::{BatchRunner, RunReport, RunnerOptions};
pub use scanner::FileInfo;
pub use summarizer::{ContextBuilder, ContextReport};
