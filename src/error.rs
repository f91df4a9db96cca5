//! Error types for Trueno-Eval
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Compile-time errors (`ComponentNotFound`, `UnknownComponent`, `UnknownStage`,
//! `SchemaMismatch`, `InvalidParameter`, ...) are raised before any trial
//! directory exists or any component is constructed. Runtime errors name the
//! failing stage and leave earlier artifacts on disk.

use crate::component::{Capability, ComponentError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Eval error types
#[derive(Error, Debug)]
pub enum Error {
    /// Registry lookup for a name that was never registered
    #[error("{capability} component '{name}' not found (known: [{}])", known.join(", "))]
    ComponentNotFound {
        /// Capability that was searched
        capability: Capability,
        /// Missing component name
        name: String,
        /// Names currently registered for that capability
        known: Vec<String>,
    },

    /// Component factory failed on first resolution (not cached, next resolve retries)
    #[error("failed to construct {capability} '{name}': {source}")]
    ComponentInit {
        /// Capability of the component
        capability: Capability,
        /// Component name
        name: String,
        /// Factory failure
        #[source]
        source: ComponentError,
    },

    /// Configuration references a component the registry does not know
    #[error("stage '{stage}' references unknown {capability} '{name}'")]
    UnknownComponent {
        /// Stage holding the reference
        stage: String,
        /// Capability of the reference
        capability: Capability,
        /// Unknown component name
        name: String,
    },

    /// Configuration names a stage kind that does not exist
    #[error("unknown stage '{stage}' (known: [{}])", known.join(", "))]
    UnknownStage {
        /// Stage name from the configuration
        stage: String,
        /// Supported stage kinds
        known: Vec<String>,
    },

    /// Module is registered for a different stage kind
    #[error("module '{module}' serves stage kind '{actual}', cannot be used in '{stage}' stage")]
    ComponentKindMismatch {
        /// Stage name
        stage: String,
        /// Module name
        module: String,
        /// Stage kind the module declares
        actual: String,
    },

    /// Two stages share the same name
    #[error("duplicate stage name '{0}'\nGive one of the stages an explicit `name`.")]
    DuplicateStage(String),

    /// Stage input requirement not satisfied by upstream output
    #[error("schema mismatch between '{upstream}' and '{downstream}': missing columns [{}]", missing.join(", "))]
    SchemaMismatch {
        /// Producing side (previous stage, "input" or "corpus")
        upstream: String,
        /// Consuming stage
        downstream: String,
        /// Required columns absent or with the wrong type
        missing: Vec<String>,
    },

    /// Stage parameters violate the module's parameter contract
    #[error("invalid parameter for stage '{stage}' (module '{module}'): {reason}")]
    InvalidParameter {
        /// Stage name
        stage: String,
        /// Module name
        module: String,
        /// Human readable reason
        reason: String,
    },

    /// Component returned a dataset that does not match its declared output (internal defect)
    #[error("stage '{stage}' violated its output contract: expected [{expected}], got [{actual}]\nThis is a component bug. Please report this issue.")]
    StageContractViolation {
        /// Stage name
        stage: String,
        /// Declared schema
        expected: String,
        /// Produced schema
        actual: String,
    },

    /// Metric value that JSON cannot represent (NaN or infinite)
    #[error("stage '{stage}' reported non-finite value {value} for metric '{metric}'")]
    NonFiniteMetric {
        /// Reporting stage, or "overall" for a reducer result
        stage: String,
        /// Metric name
        metric: String,
        /// Offending value
        value: f64,
    },

    /// Component failed at run time (after retries for transient failures)
    #[error("stage '{stage}' failed after {attempts} attempt(s): {source}")]
    StageExecution {
        /// Stage name
        stage: String,
        /// Number of attempts made
        attempts: u32,
        /// Underlying component failure
        #[source]
        source: ComponentError,
    },

    /// Run cancelled at a stage boundary or during a retry backoff
    #[error("run cancelled before stage '{stage}'")]
    Cancelled {
        /// First stage that did not start
        stage: String,
    },

    /// Trial directory could not be created
    #[error("cannot create trial under {}: {reason}", path.display())]
    TrialCreation {
        /// Directory that failed
        path: PathBuf,
        /// Cause
        reason: String,
    },

    /// Write attempted on a sealed trial
    #[error("trial '{0}' is sealed (read-only)")]
    TrialSealed(String),

    /// Resume attempted with a configuration that differs from the frozen one
    #[error("configuration differs from the one frozen in trial '{0}'\nStart a new trial instead of resuming.")]
    ConfigDrift(String),

    /// Configuration parsing error (YAML, env substitution, retry settings)
    #[error("Config error: {0}")]
    Config(String),

    /// Storage error (Parquet/Arrow, schema validation on load)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error (trial record, metrics summary)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is raised while compiling a configuration.
    #[must_use]
    pub const fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Self::ComponentNotFound { .. }
                | Self::UnknownComponent { .. }
                | Self::UnknownStage { .. }
                | Self::ComponentKindMismatch { .. }
                | Self::DuplicateStage(_)
                | Self::SchemaMismatch { .. }
                | Self::InvalidParameter { .. }
                | Self::Config(_)
        )
    }

    /// Name of the stage this error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::UnknownComponent { stage, .. }
            | Self::ComponentKindMismatch { stage, .. }
            | Self::InvalidParameter { stage, .. }
            | Self::StageContractViolation { stage, .. }
            | Self::StageExecution { stage, .. }
            | Self::NonFiniteMetric { stage, .. }
            | Self::Cancelled { stage } => Some(stage),
            Self::SchemaMismatch { downstream, .. } => Some(downstream),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_not_found_lists_known_names() {
        let err = Error::ComponentNotFound {
            capability: Capability::Embedding,
            name: "flagembed_large".to_string(),
            known: vec!["flagembed_small".to_string(), "nomic".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("flagembed_large"));
        assert!(msg.contains("flagembed_small, nomic"));
    }

    #[test]
    fn test_compile_time_classification() {
        assert!(Error::DuplicateStage("retrieval".into()).is_compile_time());
        assert!(!Error::TrialSealed("0".into()).is_compile_time());
        assert!(!Error::Cancelled {
            stage: "retrieval".into()
        }
        .is_compile_time());
    }

    #[test]
    fn test_stage_attribution() {
        let err = Error::SchemaMismatch {
            upstream: "retrieval".into(),
            downstream: "evaluation".into(),
            missing: vec!["retrieved_ids".into()],
        };
        assert_eq!(err.stage(), Some("evaluation"));
        assert_eq!(Error::Other("x".into()).stage(), None);
    }
}
