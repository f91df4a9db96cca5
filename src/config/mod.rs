//! Pipeline configuration (YAML) and compilation into stage plans
//!
//! ```yaml
//! name: bm25-baseline
//! retry:
//!   max_retries: 3
//!   base_backoff_ms: 500
//! stages:
//!   - stage: retrieval
//!     module: bm25
//!     params:
//!       top_k: 5
//!   - stage: evaluation
//!     module: retrieval_eval
//!     params:
//!       k: 1
//!       metrics: [hit, mrr]
//! ```
//!
//! `${VAR}` references are replaced with environment values before parsing.

mod compiler;

pub use compiler::{ConfigCompiler, PlanInputs, StagePlan, StageSpec};

use crate::component::Params;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_BACKOFF_MS: u64 = 500;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Declarative pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Optional experiment name (prefixes trial ids)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Retry policy for transient component failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Ordered stage definitions
    pub stages: Vec<StageConfig>,
}

/// One stage definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Stage kind (`retrieval`, `evaluation`, ...)
    pub stage: String,
    /// Unique stage name; defaults to the stage kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registered module name
    pub module: String,
    /// Module parameters
    #[serde(default)]
    pub params: Params,
}

impl StageConfig {
    /// Stage with no parameters.
    #[must_use]
    pub fn new(stage: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            name: None,
            module: module.into(),
            params: Params::new(),
        }
    }

    /// Set an explicit stage name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Effective stage name.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.stage)
    }
}

/// Retry settings for transient component failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per attempt
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Backoff ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_base_backoff_ms() -> u64 {
    DEFAULT_BASE_BACKOFF_MS
}

const fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl PipelineConfig {
    /// Configuration with default retry settings.
    #[must_use]
    pub fn new(stages: Vec<StageConfig>) -> Self {
        Self {
            name: None,
            retry: RetryConfig::default(),
            stages,
        }
    }

    /// Set the experiment name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the retry settings.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Render as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("cannot render YAML: {e}")))
    }
}

fn env_var_regex() -> Result<&'static Regex> {
    static ENV_VAR_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    ENV_VAR_RE
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}"))
        .as_ref()
        .map_err(|e| Error::Config(format!("invalid environment variable pattern: {e}")))
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = env_var_regex()?.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.push(caps[1].to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(Error::Config(format!(
            "Missing environment variable(s): {}",
            missing.join(", ")
        )))
    }
}

/// Parse a pipeline YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml: &str) -> Result<PipelineConfig> {
    let substituted = substitute_env_vars(yaml)?;
    serde_yaml::from_str(&substituted)
        .map_err(|e| Error::Config(format!("Failed to parse pipeline YAML: {e}")))
}

/// Parse a pipeline YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read pipeline file {}: {e}", path.display()))
    })?;
    parse_config_str(&content)
}
