//! Runtime configuration for the `autocomment` binary.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by `main`)
//! 2. Environment variable overrides (e.g. `AUTOCOMMENT_PRIMARY_MODEL`)
//! 3. Values from the TOML file
//! 4. Built-in defaults
//!
//! ## Model roles
//!
//! | Role    | Used for                      | Default                 |
//! |---------|-------------------------------|-------------------------|
//! | primary | first-pass comment generation | `gemini-2.5-flash-lite` |
//! | repair  | self-repair after a violation | `gemini-2.5-pro`        |

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use guardrails::GuardConfig;
use serde::{Deserialize, Serialize};

/// Public Generative Language API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_REPAIR_MODEL: &str = "gemini-2.5-pro";
/// Files annotated at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Line budget per scheduling batch.
pub const DEFAULT_BATCH_MAX_LINES: usize = 2_000;
/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "autocomment.toml";
/// Context store location, relative to the project root.
pub const DEFAULT_CONTEXT_STORE: &str = ".autocomment/context.json";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_BASE_URL: &str = "AUTOCOMMENT_BASE_URL";
pub const ENV_PRIMARY_MODEL: &str = "AUTOCOMMENT_PRIMARY_MODEL";
pub const ENV_REPAIR_MODEL: &str = "AUTOCOMMENT_REPAIR_MODEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Never written back out; prefer the environment variable.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub primary_model: String,
    pub repair_model: String,
    pub concurrency: usize,
    pub batch_max_lines: usize,
    /// Context store path; defaults to `DEFAULT_CONTEXT_STORE` under the root.
    pub context_store: Option<PathBuf>,
    pub guard: GuardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            repair_model: DEFAULT_REPAIR_MODEL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            batch_max_lines: DEFAULT_BATCH_MAX_LINES,
            context_store: None,
            guard: GuardConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid autocomment config")
    }

    /// Load from `path`, or from `autocomment.toml` if present, then apply
    /// environment overrides.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup; empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(model) = get(ENV_PRIMARY_MODEL) {
            self.primary_model = model;
        }
        if let Some(model) = get(ENV_REPAIR_MODEL) {
            self.repair_model = model;
        }
    }

    pub fn context_store_path(&self, root: &Path) -> PathBuf {
        match &self.context_store {
            Some(path) => path.clone(),
            None => root.join(DEFAULT_CONTEXT_STORE),
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("no API key configured; set {ENV_API_KEY}"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.batch_max_lines == 0 {
            bail!("batch_max_lines must be at least 1");
        }
        if self.guard.attempt_timeout_secs == 0 {
            bail!("guard.attempt_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
