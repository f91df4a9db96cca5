//! Trial Manager - isolated, versioned trial directories
//!
//! Directory creation uses `create_dir` (not `create_dir_all`) on the final
//! trial path: the call either creates the directory or fails with
//! `AlreadyExists`, so two trials started concurrently in one project always
//! end up in different directories.

use super::{ArtifactRecord, TrialRecord, TrialStatus};
use crate::config::{PipelineConfig, StageSpec};
use crate::dataset::Dataset;
use crate::storage::TabularStore;
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Frozen resolved configuration.
pub const CONFIG_FILE: &str = "config.yaml";
/// Trial record.
pub const RECORD_FILE: &str = "trial.json";
/// Metrics summary.
pub const SUMMARY_FILE: &str = "summary.json";

/// Creates and opens trials under one project directory.
#[derive(Debug, Clone)]
pub struct TrialManager {
    project_dir: PathBuf,
}

impl TrialManager {
    /// Manager for `project_dir` (created on the first `start_trial`).
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    /// Base project directory.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Create a fresh trial for `config` and freeze the configuration into it.
    ///
    /// Trial ids are the first free integer (`0`, `1`, ...) or `<name>_<n>`
    /// when the configuration is named. Existing trials are never reused.
    ///
    /// # Errors
    ///
    /// Returns `TrialCreation` if the project or trial directory cannot be
    /// created, or the frozen files cannot be written.
    pub fn start_trial(&self, config: &PipelineConfig) -> Result<Trial> {
        if let Some(name) = config.name.as_deref() {
            if !is_valid_id(name) {
                return Err(self.creation_error(format!(
                    "experiment name '{name}' must be ASCII letters, digits, '_' or '-'"
                )));
            }
        }
        fs::create_dir_all(&self.project_dir)
            .map_err(|e| self.creation_error(format!("cannot create project directory: {e}")))?;

        let (trial_id, dir) = self.claim_directory(config.name.as_deref())?;
        let yaml = config.to_yaml()?;
        let json = serde_json::to_value(config)?;
        let trial = Trial {
            dir,
            record: TrialRecord::new(trial_id, config.name.clone(), json),
        };
        let frozen = TabularStore::write_file(trial.config_path(), yaml.as_bytes())
            .and_then(|()| trial.save());
        if let Err(e) = frozen {
            return Err(Error::TrialCreation {
                path: trial.dir.clone(),
                reason: e.to_string(),
            });
        }

        tracing::info!(trial = %trial.id(), dir = %trial.dir.display(), "Trial created");
        Ok(trial)
    }

    fn claim_directory(&self, name: Option<&str>) -> Result<(String, PathBuf)> {
        for n in 0u64.. {
            let trial_id = name.map_or_else(|| n.to_string(), |name| format!("{name}_{n}"));
            let dir = self.project_dir.join(&trial_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((trial_id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(Error::TrialCreation {
                        path: dir,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Err(self.creation_error("trial id space exhausted".to_string()))
    }

    fn creation_error(&self, reason: String) -> Error {
        Error::TrialCreation {
            path: self.project_dir.clone(),
            reason,
        }
    }

    /// Open an existing trial.
    ///
    /// # Errors
    ///
    /// Returns an error if the trial does not exist or its record is unreadable.
    pub fn open(&self, trial_id: &str) -> Result<Trial> {
        if !is_valid_id(trial_id) {
            return Err(Error::Storage(format!("invalid trial id '{trial_id}'")));
        }
        let dir = self.project_dir.join(trial_id);
        let record = read_record(&dir)?;
        Ok(Trial { dir, record })
    }

    /// Records of every trial in the project, oldest first.
    ///
    /// Directories without a readable `trial.json` are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the project directory cannot be listed.
    pub fn list_trials(&self) -> Result<Vec<TrialRecord>> {
        if !self.project_dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.project_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::debug!(dir = %path.display(), error = %e, "Skipping non-trial directory"),
            }
        }
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.trial_id().cmp(b.trial_id()))
        });
        Ok(records)
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn read_record(dir: &Path) -> Result<TrialRecord> {
    let path = dir.join(RECORD_FILE);
    let bytes = fs::read(&path)
        .map_err(|e| Error::Storage(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Handle to one trial directory.
///
/// Every write goes through the handle and lands inside [`Trial::dir`].
#[derive(Debug)]
pub struct Trial {
    dir: PathBuf,
    record: TrialRecord,
}

impl Trial {
    /// Trial id (directory name).
    #[must_use]
    pub fn id(&self) -> &str {
        self.record.trial_id()
    }

    /// Trial directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current record.
    #[must_use]
    pub const fn record(&self) -> &TrialRecord {
        &self.record
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.record.status()
    }

    /// Whether the trial is read-only.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.record.is_sealed()
    }

    /// Path of the frozen configuration.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path of the metrics summary.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    /// Path of a stage artifact.
    #[must_use]
    pub fn artifact_path(&self, stage: &StageSpec) -> PathBuf {
        self.dir.join(stage.artifact_file_name())
    }

    /// Parse the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.yaml` is missing or invalid.
    pub fn frozen_config(&self) -> Result<PipelineConfig> {
        let yaml = fs::read_to_string(self.config_path())?;
        serde_yaml::from_str(&yaml)
            .map_err(|e| Error::Config(format!("invalid frozen configuration: {e}")))
    }

    /// Fail with `TrialSealed` if the trial is read-only.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` for sealed trials.
    pub fn ensure_writable(&self) -> Result<()> {
        if self.is_sealed() {
            Err(Error::TrialSealed(self.id().to_string()))
        } else {
            Ok(())
        }
    }

    /// Transition to Running.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` or a write error.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.record.start();
        self.save()
    }

    /// Persist a stage output and record it.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` or a storage error.
    pub fn persist_artifact(
        &mut self,
        stage: &StageSpec,
        dataset: &Dataset,
        attempts: u32,
        elapsed: Duration,
    ) -> Result<ArtifactRecord> {
        self.ensure_writable()?;
        let file = stage.artifact_file_name();
        let size = TabularStore::write_parquet(self.dir.join(&file), dataset)?;
        let artifact = ArtifactRecord::new(
            self.id(),
            stage.name(),
            stage.index(),
            file,
            dataset.num_rows() as u64,
            size,
        )
        .with_execution(attempts, u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        self.record.push_artifact(artifact.clone());
        self.save()?;
        Ok(artifact)
    }

    /// Load a persisted stage output, checking its declared schema.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the stage has no artifact or it does not
    /// carry the declared columns.
    pub fn load_artifact(&self, stage: &StageSpec) -> Result<Dataset> {
        let artifact = self.record.artifact(stage.name()).ok_or_else(|| {
            Error::Storage(format!(
                "trial '{}' has no artifact for stage '{}'",
                self.id(),
                stage.name()
            ))
        })?;
        TabularStore::load(self.dir.join(artifact.file()), stage.output_schema())
    }

    /// Record the final status of a run.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` or a write error.
    pub fn complete(&mut self, status: TrialStatus, error: Option<String>) -> Result<()> {
        self.ensure_writable()?;
        self.record.complete(status, error);
        self.save()
    }

    /// Make the trial read-only.
    ///
    /// # Errors
    ///
    /// Returns a write error.
    pub fn seal(&mut self) -> Result<()> {
        if self.is_sealed() {
            return Ok(());
        }
        self.record.seal();
        self.save()?;
        tracing::info!(trial = %self.id(), status = ?self.status(), "Trial sealed");
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.record)?;
        TabularStore::write_file(self.dir.join(RECORD_FILE), &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;

    fn config() -> PipelineConfig {
        PipelineConfig::new(vec![StageConfig::new("retrieval", "bm25").param("top_k", 3)])
    }

    #[test]
    fn test_start_trial_creates_numbered_directories() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path().join("benchmark"));
        let first = manager.start_trial(&config()).unwrap();
        let second = manager.start_trial(&config()).unwrap();
        assert_eq!(first.id(), "0");
        assert_eq!(second.id(), "1");
        assert!(first.config_path().exists());
        assert!(first.dir().join(RECORD_FILE).exists());
    }

    #[test]
    fn test_named_trials_use_name_prefix() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path());
        let trial = manager.start_trial(&config().named("bm25")).unwrap();
        assert_eq!(trial.id(), "bm25_0");
        assert_eq!(trial.record().name(), Some("bm25"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path());
        let err = manager.start_trial(&config().named("../x")).unwrap_err();
        assert!(matches!(err, Error::TrialCreation { .. }));
    }

    #[test]
    fn test_frozen_config_roundtrip() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path());
        let trial = manager.start_trial(&config()).unwrap();
        assert_eq!(trial.frozen_config().unwrap(), config());
    }

    #[test]
    fn test_open_and_list() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path());
        manager.start_trial(&config()).unwrap();
        manager.start_trial(&config()).unwrap();
        fs::create_dir(project.path().join("scratch")).unwrap();

        let opened = manager.open("1").unwrap();
        assert_eq!(opened.status(), TrialStatus::Pending);
        let ids: Vec<String> = manager
            .list_trials()
            .unwrap()
            .iter()
            .map(|r| r.trial_id().to_string())
            .collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert!(manager.open("7").is_err());
    }

    #[test]
    fn test_sealed_trial_rejects_writes() {
        let project = tempfile::tempdir().unwrap();
        let manager = TrialManager::new(project.path());
        let mut trial = manager.start_trial(&config()).unwrap();
        trial.complete(TrialStatus::Success, None).unwrap();
        trial.seal().unwrap();
        assert!(matches!(trial.start(), Err(Error::TrialSealed(_))));
        assert!(manager.open("0").unwrap().is_sealed());
    }
}
