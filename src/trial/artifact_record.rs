//! Artifact Record - one persisted stage output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artifact Record describes the Parquet file a stage left in its trial.
///
/// The file name is `NN-<stage>.parquet` where `NN` is the stage index, so a
/// directory listing reads in plan order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    trial_id: String,
    stage: String,
    index: usize,
    file: String,
    rows: u64,
    size_bytes: u64,
    attempts: u32,
    duration_ms: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record (one attempt, zero duration).
    ///
    /// # Arguments
    ///
    /// * `trial_id` - ID of the owning trial
    /// * `stage` - Stage name
    /// * `index` - Stage position in the plan
    /// * `file` - File name inside the trial directory
    /// * `rows` - Row count of the dataset
    /// * `size_bytes` - Size of the Parquet file
    #[must_use]
    pub fn new(
        trial_id: impl Into<String>,
        stage: impl Into<String>,
        index: usize,
        file: impl Into<String>,
        rows: u64,
        size_bytes: u64,
    ) -> Self {
        Self {
            trial_id: trial_id.into(),
            stage: stage.into(),
            index,
            file: file.into(),
            rows,
            size_bytes,
            attempts: 1,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// Set execution statistics.
    #[must_use]
    pub const fn with_execution(mut self, attempts: u32, duration_ms: u64) -> Self {
        self.attempts = attempts;
        self.duration_ms = duration_ms;
        self
    }

    /// Get the trial ID.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Get the stage index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Get the file name.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Get the row count.
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Get the file size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the number of attempts the stage needed.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the stage wall time in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_record_new() {
        let artifact = ArtifactRecord::new("3", "retrieval", 0, "00-retrieval.parquet", 3, 1000)
            .with_execution(2, 15);
        assert_eq!(artifact.trial_id(), "3");
        assert_eq!(artifact.file(), "00-retrieval.parquet");
        assert_eq!(artifact.rows(), 3);
        assert_eq!(artifact.attempts(), 2);
        assert_eq!(artifact.duration_ms(), 15);
    }
}
