//! Evaluator facade
//!
//! Bundles the input datasets, a project directory and an executor so that a
//! trial is one call:
//!
//! ```text
//! start_trial(config.yaml)
//!   parse + substitute ${VAR}
//!   compile against the loaded schemas   (project untouched on error)
//!   create <project>/<id>/, freeze config
//!   run every stage
//! ```

use crate::config::{parse_config, ConfigCompiler, PipelineConfig, PlanInputs, StagePlan};
use crate::dataset::{Dataset, DatasetKind};
use crate::executor::PipelineExecutor;
use crate::metrics::{MetricsAggregator, MetricsSummary, RankedTrial};
use crate::registry::ModuleRegistry;
use crate::storage::TabularStore;
use crate::trial::TrialManager;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs configured pipelines over fixed inputs in one project directory.
#[derive(Debug, Clone)]
pub struct Evaluator {
    initial: Dataset,
    corpus: Option<Dataset>,
    trials: TrialManager,
    executor: PipelineExecutor,
}

impl Evaluator {
    /// Load question and corpus Parquet files.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if either file is unreadable, lacks required
    /// columns or has duplicate keys.
    pub fn new(
        qa_path: impl AsRef<Path>,
        corpus_path: impl AsRef<Path>,
        project_dir: impl Into<PathBuf>,
        registry: Arc<ModuleRegistry>,
    ) -> Result<Self> {
        let initial = TabularStore::load_kind(qa_path, DatasetKind::Question)?;
        let corpus = TabularStore::load_kind(corpus_path, DatasetKind::Corpus)?;
        tracing::info!(
            questions = initial.num_rows(),
            documents = corpus.num_rows(),
            "Evaluation data loaded"
        );
        Ok(Self::for_dataset(initial, Some(corpus), project_dir, registry))
    }

    /// Evaluator over arbitrary in-memory inputs (parse or chunk pipelines).
    #[must_use]
    pub fn for_dataset(
        initial: Dataset,
        corpus: Option<Dataset>,
        project_dir: impl Into<PathBuf>,
        registry: Arc<ModuleRegistry>,
    ) -> Self {
        Self {
            initial,
            corpus,
            trials: TrialManager::new(project_dir),
            executor: PipelineExecutor::new(registry),
        }
    }

    /// Use custom metric reducers.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: MetricsAggregator) -> Self {
        self.executor = self.executor.with_aggregator(aggregator);
        self
    }

    /// Token cancelling running trials at the next stage boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.executor.cancellation_token()
    }

    /// Trial manager of the project directory.
    #[must_use]
    pub const fn trial_manager(&self) -> &TrialManager {
        &self.trials
    }

    /// Executor used for trials.
    #[must_use]
    pub const fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Initial dataset of every trial.
    #[must_use]
    pub const fn dataset(&self) -> &Dataset {
        &self.initial
    }

    /// Corpus side input.
    #[must_use]
    pub const fn corpus(&self) -> Option<&Dataset> {
        self.corpus.as_ref()
    }

    /// Compile `config` against the loaded inputs.
    ///
    /// # Errors
    ///
    /// Returns the first compile-time error.
    pub fn compile(&self, config: &PipelineConfig) -> Result<StagePlan> {
        let inputs = PlanInputs::from_datasets(&self.initial, self.corpus.as_ref());
        ConfigCompiler::new(self.executor.registry()).compile(config, &inputs)
    }

    /// Parse, compile and run the configuration at `config_path` as a new trial.
    ///
    /// # Errors
    ///
    /// Configuration and compile errors are returned before any trial
    /// directory exists; execution errors leave the trial recorded on disk.
    pub async fn start_trial(&self, config_path: impl AsRef<Path>) -> Result<MetricsSummary> {
        let config = parse_config(config_path)?;
        self.start_trial_with(&config).await
    }

    /// Compile and run an in-memory configuration as a new trial.
    ///
    /// # Errors
    ///
    /// See [`start_trial`](Self::start_trial).
    pub async fn start_trial_with(&self, config: &PipelineConfig) -> Result<MetricsSummary> {
        let plan = self.compile(config)?;
        let mut trial = self.trials.start_trial(plan.config())?;
        self.executor
            .run(&plan, &self.initial, self.corpus.as_ref(), &mut trial)
            .await
    }

    /// Resume the unsealed trial `trial_id` with the configuration at `config_path`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` for unknown trials, `TrialSealed` for finished ones,
    /// `ConfigDrift` when the configuration changed, then any execution error.
    pub async fn resume_trial(
        &self,
        trial_id: &str,
        config_path: impl AsRef<Path>,
    ) -> Result<MetricsSummary> {
        let config = parse_config(config_path)?;
        let plan = self.compile(&config)?;
        let mut trial = self.trials.open(trial_id)?;
        self.executor
            .resume(&plan, &self.initial, self.corpus.as_ref(), &mut trial)
            .await
    }

    /// Trials of the project ranked by an overall metric, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the project directory cannot be read.
    pub fn leaderboard(&self, metric: &str) -> Result<Vec<RankedTrial>> {
        MetricsAggregator::leaderboard(&self.trials, metric)
    }
}
