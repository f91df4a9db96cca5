//! Trial Record - lifecycle of one pipeline run

use super::ArtifactRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    /// Trial directory exists, no stage has started.
    Pending,
    /// Stages are executing.
    Running,
    /// Every stage completed.
    Success,
    /// A stage failed.
    Failed,
    /// Cancelled at a stage boundary.
    Cancelled,
}

/// Trial Record is the `trial.json` file of a trial directory.
///
/// It carries the frozen configuration (as JSON, for drift checks on resume)
/// and one [`ArtifactRecord`] per completed stage, in plan order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    trial_id: String,
    name: Option<String>,
    status: TrialStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    sealed: bool,
    config: serde_json::Value,
    artifacts: Vec<ArtifactRecord>,
    error: Option<String>,
}

impl TrialRecord {
    /// Create a new trial record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `trial_id` - Directory name of the trial
    /// * `name` - Experiment name from the configuration, if any
    /// * `config` - Resolved configuration as JSON
    #[must_use]
    pub fn new(
        trial_id: impl Into<String>,
        name: Option<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            trial_id: trial_id.into(),
            name,
            status: TrialStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            sealed: false,
            config,
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Get the trial ID.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the (latest) start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Whether the trial is read-only.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Get the frozen configuration.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Get the artifacts of completed stages, in plan order.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRecord] {
        &self.artifacts
    }

    /// Get the artifact of a stage.
    #[must_use]
    pub fn artifact(&self, stage: &str) -> Option<&ArtifactRecord> {
        self.artifacts.iter().find(|a| a.stage() == stage)
    }

    /// Get the failure message of the last run, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transition to Running (also used when resuming).
    pub fn start(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
        self.error = None;
    }

    /// Record the final status of the run.
    pub fn complete(&mut self, status: TrialStatus, error: Option<String>) {
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.error = error;
    }

    /// Mark the trial read-only.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Add an artifact, replacing an earlier one for the same stage.
    pub fn push_artifact(&mut self, artifact: ArtifactRecord) {
        match self
            .artifacts
            .iter_mut()
            .find(|existing| existing.stage() == artifact.stage())
        {
            Some(slot) => *slot = artifact,
            None => {
                self.artifacts.push(artifact);
                self.artifacts.sort_by_key(ArtifactRecord::index);
            }
        }
    }
}
