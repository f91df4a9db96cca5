//! Trial tracking
//!
//! A trial is the durable record of one pipeline run: one directory per
//! trial, never shared between runs.
//!
//! ## Layout
//!
//! ```text
//! <project>/
//! └── <trial id>/
//!     ├── config.yaml           frozen resolved configuration
//!     ├── trial.json            TrialRecord (status, timestamps, artifacts)
//!     ├── 00-<stage>.parquet    one artifact per completed stage
//!     ├── 01-<stage>.parquet
//!     └── summary.json          MetricsSummary
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_eval::config::{PipelineConfig, StageConfig};
//! use trueno_eval::trial::{TrialManager, TrialStatus};
//!
//! let project = tempfile::tempdir()?;
//! let manager = TrialManager::new(project.path());
//!
//! let config = PipelineConfig::new(vec![StageConfig::new("retrieval", "bm25")]);
//! let mut trial = manager.start_trial(&config)?;
//! assert_eq!(trial.id(), "0");
//!
//! trial.start()?;
//! trial.complete(TrialStatus::Success, None)?;
//! trial.seal()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod artifact_record;
mod manager;
mod trial_record;

pub use artifact_record::ArtifactRecord;
pub use manager::{Trial, TrialManager, CONFIG_FILE, RECORD_FILE, SUMMARY_FILE};
pub use trial_record::{TrialRecord, TrialStatus};
