//! Pipeline executor
//!
//! Runs a compiled [`StagePlan`] stage by stage inside one trial:
//!
//! ```text
//! for each stage:
//!   cancelled?  ──yes──> trial = Cancelled, stop
//!   resolve module (registry, cached)
//!   run module ──transient error──> backoff, retry (bounded)
//!              ──fatal error──────> trial = Failed, StageExecution
//!   output carries declared columns? ──no──> trial = Failed + sealed, StageContractViolation
//!   persist NN-<stage>.parquet, record metrics
//!   next input = artifact reloaded from disk
//! finalize metrics, trial = Success + sealed
//! ```
//!
//! Stages are strictly sequential: stage N+1 reads stage N's durable artifact,
//! never an in-memory handoff. Concurrency inside a stage belongs to the module.
//! Cancellation is checked at stage boundaries only.

mod retry;

pub use retry::RetryPolicy;

use crate::component::{ComponentError, ComponentResult, StageInput, StageOutput};
use crate::config::{StagePlan, StageSpec};
use crate::dataset::Dataset;
use crate::metrics::{MetricsAggregator, MetricsSummary};
use crate::registry::ModuleRegistry;
use crate::trial::{Trial, TrialStatus};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs stage plans against datasets, recording into trials.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<ModuleRegistry>,
    aggregator: MetricsAggregator,
    cancel: CancellationToken,
}

impl PipelineExecutor {
    /// Executor resolving modules from `registry`.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            aggregator: MetricsAggregator::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a configured metrics aggregator (custom reducers).
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: MetricsAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Observe an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this executor at the next stage boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registry used for module resolution.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Metrics aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    /// Run every stage of `plan`, starting from `initial`.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` if `initial` or `corpus` lack columns the plan was
    ///   compiled against (the trial is left untouched)
    /// - `StageExecution` for component failures (after retries)
    /// - `StageContractViolation` when a module breaks its declared output
    /// - `Cancelled` when cancelled before a stage or while waiting to retry one
    pub async fn run(
        &self,
        plan: &StagePlan,
        initial: &Dataset,
        corpus: Option<&Dataset>,
        trial: &mut Trial,
    ) -> Result<MetricsSummary> {
        check_inputs(plan, Some(initial), corpus)?;
        trial.start()?;
        self.execute_from(plan, 0, initial.clone(), corpus, trial).await
    }

    /// Continue an unsealed trial at its first stage without an artifact.
    ///
    /// The input of that stage is the previous stage's persisted artifact
    /// (`initial` is only read when no stage completed yet).
    ///
    /// # Errors
    ///
    /// - `TrialSealed` if the trial already finished or failed irrecoverably
    /// - `ConfigDrift` if `plan` was not compiled from the frozen configuration
    /// - any error of [`run`](Self::run) for the remaining stages
    pub async fn resume(
        &self,
        plan: &StagePlan,
        initial: &Dataset,
        corpus: Option<&Dataset>,
        trial: &mut Trial,
    ) -> Result<MetricsSummary> {
        trial.ensure_writable()?;
        let planned = serde_json::to_value(plan.config())?;
        if trial.record().config() != &planned {
            return Err(Error::ConfigDrift(trial.id().to_string()));
        }

        let start = plan
            .stages()
            .iter()
            .position(|stage| trial.record().artifact(stage.name()).is_none())
            .unwrap_or(plan.len());
        let input = if start == 0 {
            check_inputs(plan, Some(initial), corpus)?;
            initial.clone()
        } else {
            check_inputs(plan, None, corpus)?;
            trial.load_artifact(&plan.stages()[start - 1])?
        };

        tracing::info!(trial = %trial.id(), from_stage = start, "Resuming trial");
        trial.start()?;
        self.execute_from(plan, start, input, corpus, trial).await
    }

    async fn execute_from(
        &self,
        plan: &StagePlan,
        start: usize,
        input: Dataset,
        corpus: Option<&Dataset>,
        trial: &mut Trial,
    ) -> Result<MetricsSummary> {
        let policy = RetryPolicy::from(plan.retry());
        let mut current = input;

        for stage in &plan.stages()[start..] {
            if self.cancel.is_cancelled() {
                tracing::warn!(trial = %trial.id(), stage = stage.name(), "Run cancelled");
                let err = Error::Cancelled {
                    stage: stage.name().to_string(),
                };
                trial.complete(TrialStatus::Cancelled, Some(err.to_string()))?;
                return Err(err);
            }

            match self.execute_stage(stage, &current, corpus, policy, trial).await {
                Ok(next) => current = next,
                Err(err) => return Err(fail(trial, err)),
            }
        }

        let summary = match self.aggregator.finalize(trial) {
            Ok(summary) => summary,
            Err(err) => return Err(fail(trial, err)),
        };
        trial.complete(TrialStatus::Success, None)?;
        trial.seal()?;
        tracing::info!(trial = %trial.id(), stages = plan.len(), "Trial completed");
        Ok(summary)
    }

    async fn execute_stage(
        &self,
        stage: &StageSpec,
        input: &Dataset,
        corpus: Option<&Dataset>,
        policy: RetryPolicy,
        trial: &mut Trial,
    ) -> Result<Dataset> {
        let started = Instant::now();
        let (output, attempts) = self.run_with_retry(stage, input, corpus, policy).await?;

        let actual = output.dataset.schema_spec();
        if !stage.output_schema().is_satisfied_by(&actual) {
            return Err(Error::StageContractViolation {
                stage: stage.name().to_string(),
                expected: stage.output_schema().to_string(),
                actual: actual.to_string(),
            });
        }

        let artifact = trial.persist_artifact(stage, &output.dataset, attempts, started.elapsed())?;
        if !output.metrics.is_empty() {
            self.aggregator.record(trial, stage.name(), &output.metrics)?;
        }
        tracing::info!(
            trial = %trial.id(),
            stage = stage.name(),
            module = stage.module(),
            rows = artifact.rows(),
            attempts,
            duration_ms = artifact.duration_ms(),
            "Stage completed"
        );

        trial.load_artifact(stage)
    }

    async fn run_with_retry(
        &self,
        stage: &StageSpec,
        input: &Dataset,
        corpus: Option<&Dataset>,
        policy: RetryPolicy,
    ) -> Result<(StageOutput, u32)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(stage, input, corpus).await {
                Ok(output) => return Ok((output, attempt)),
                Err(err) if policy.should_retry(&err, attempt) => {
                    let delay = policy.backoff(attempt, err.retry_after());
                    tracing::warn!(
                        stage = stage.name(),
                        module = stage.module(),
                        attempt,
                        max_retries = policy.max_retries(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient stage failure, will retry"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            return Err(Error::Cancelled {
                                stage: stage.name().to_string(),
                            });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    return Err(Error::StageExecution {
                        stage: stage.name().to_string(),
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }

    async fn attempt(
        &self,
        stage: &StageSpec,
        input: &Dataset,
        corpus: Option<&Dataset>,
    ) -> ComponentResult<StageOutput> {
        let module = self
            .registry
            .resolve_module(stage.module())
            .map_err(ComponentError::from)?;
        module
            .run(StageInput {
                stage: stage.name(),
                dataset: input,
                params: stage.params(),
                corpus,
                resources: &self.registry,
            })
            .await
    }
}

/// Check real inputs against the schemas the plan was compiled for.
fn check_inputs(plan: &StagePlan, initial: Option<&Dataset>, corpus: Option<&Dataset>) -> Result<()> {
    let downstream = plan
        .stages()
        .first()
        .map_or_else(String::new, |s| s.name().to_string());
    if let Some(initial) = initial {
        let missing = plan.inputs().dataset().missing_from(&initial.schema_spec());
        if !missing.is_empty() {
            return Err(Error::SchemaMismatch {
                upstream: "input".to_string(),
                downstream,
                missing,
            });
        }
    }
    if let Some(expected) = plan.inputs().corpus() {
        let missing = match corpus {
            Some(corpus) => expected.missing_from(&corpus.schema_spec()),
            None => expected.columns().iter().map(ToString::to_string).collect(),
        };
        if !missing.is_empty() {
            return Err(Error::SchemaMismatch {
                upstream: "corpus".to_string(),
                downstream,
                missing,
            });
        }
    }
    Ok(())
}

/// Record a fatal failure on the trial and hand the error back.
///
/// Contract violations seal the trial; other failures leave it resumable.
fn fail(trial: &mut Trial, err: Error) -> Error {
    let status = if matches!(err, Error::Cancelled { .. }) {
        tracing::warn!(trial = %trial.id(), stage = ?err.stage(), "Run cancelled during retry backoff");
        TrialStatus::Cancelled
    } else {
        tracing::error!(trial = %trial.id(), stage = ?err.stage(), error = %err, "Stage failed");
        TrialStatus::Failed
    };
    let recorded = trial
        .complete(status, Some(err.to_string()))
        .and_then(|()| {
            if matches!(err, Error::StageContractViolation { .. }) {
                trial.seal()
            } else {
                Ok(())
            }
        });
    if let Err(record_err) = recorded {
        tracing::error!(trial = %trial.id(), error = %record_err, "Could not record trial failure");
    }
    err
}
