//! Metrics aggregation
//!
//! Each stage may report a flat `metric -> value` map. The aggregator keeps
//! them in the trial's `summary.json`:
//!
//! ```text
//! MetricsSummary
//! ├── stages:  [ { stage: "evaluation", values: { "hit@1": 0.67, "mrr": 0.83 } }, ... ]
//! └── overall: { "hit@1": 0.67, "mrr": 0.83 }      (reduced across stages at finalize)
//! ```
//!
//! Recording a stage twice replaces its entry (last write wins); other
//! stages' entries are untouched. `finalize` reduces every metric name
//! across the stages that reported it and seals the summary.

use crate::storage::TabularStore;
use crate::trial::{Trial, TrialManager, SUMMARY_FILE};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// serde_json writes NaN and infinity as `null`, which cannot be read back.
fn ensure_finite(stage: &str, metrics: &BTreeMap<String, f64>) -> Result<()> {
    match metrics.iter().find(|(_, value)| !value.is_finite()) {
        Some((metric, value)) => Err(Error::NonFiniteMetric {
            stage: stage.to_string(),
            metric: metric.clone(),
            value: *value,
        }),
        None => Ok(()),
    }
}

/// Metrics reported by one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageMetrics {
    stage: String,
    values: BTreeMap<String, f64>,
    recorded_at: DateTime<Utc>,
}

impl StageMetrics {
    /// Get the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Get the metric values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Get the recording timestamp.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

/// Per-stage metrics plus an overall aggregate for one trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    trial_id: String,
    stages: Vec<StageMetrics>,
    overall: BTreeMap<String, f64>,
    sealed: bool,
}

impl MetricsSummary {
    /// Empty summary for a trial.
    #[must_use]
    pub fn new(trial_id: impl Into<String>) -> Self {
        Self {
            trial_id: trial_id.into(),
            stages: Vec::new(),
            overall: BTreeMap::new(),
            sealed: false,
        }
    }

    /// Get the trial ID.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the stage entries, in recording order.
    #[must_use]
    pub fn stages(&self) -> &[StageMetrics] {
        &self.stages
    }

    /// Metrics of one stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&BTreeMap<String, f64>> {
        self.stages
            .iter()
            .find(|s| s.stage == name)
            .map(StageMetrics::values)
    }

    /// One metric of one stage.
    #[must_use]
    pub fn value(&self, stage: &str, metric: &str) -> Option<f64> {
        self.stage(stage).and_then(|values| values.get(metric).copied())
    }

    /// Overall aggregate (empty until finalized).
    #[must_use]
    pub const fn overall(&self) -> &BTreeMap<String, f64> {
        &self.overall
    }

    /// Whether the summary has been finalized.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Insert or replace the entry for `stage`.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` once the summary is finalized.
    pub fn upsert(&mut self, stage: &str, values: BTreeMap<String, f64>) -> Result<()> {
        if self.sealed {
            return Err(Error::TrialSealed(self.trial_id.clone()));
        }
        let entry = StageMetrics {
            stage: stage.to_string(),
            values,
            recorded_at: Utc::now(),
        };
        match self.stages.iter_mut().find(|s| s.stage == stage) {
            Some(slot) => *slot = entry,
            None => self.stages.push(entry),
        }
        Ok(())
    }

    fn seal(&mut self, overall: BTreeMap<String, f64>) {
        self.overall = overall;
        self.sealed = true;
    }
}

type ReduceFn = dyn Fn(&[f64]) -> f64 + Send + Sync;

/// How values of one metric are combined across stages.
#[derive(Clone, Default)]
pub enum Reducer {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Largest value
    Max,
    /// Smallest value
    Min,
    /// Sum
    Sum,
    /// Value of the last stage that reported the metric
    Last,
    /// Caller-supplied reduction
    Custom(Arc<ReduceFn>),
}

impl Reducer {
    /// Caller-supplied reducer.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Reduce `values` (non-empty, in stage order).
    #[must_use]
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Sum => values.iter().sum(),
            Self::Last => values.last().copied().unwrap_or(0.0),
            Self::Custom(f) => f(values),
        }
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => f.write_str("Mean"),
            Self::Max => f.write_str("Max"),
            Self::Min => f.write_str("Min"),
            Self::Sum => f.write_str("Sum"),
            Self::Last => f.write_str("Last"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTrial {
    /// Trial id
    pub trial_id: String,
    /// Overall value of the ranking metric
    pub value: f64,
}

/// Records stage metrics into trial summaries.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    default_reducer: Reducer,
    reducers: HashMap<String, Reducer>,
}

impl MetricsAggregator {
    /// Aggregator reducing every metric with the mean.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reducer for metrics without a specific one.
    #[must_use]
    pub fn with_default_reducer(mut self, reducer: Reducer) -> Self {
        self.default_reducer = reducer;
        self
    }

    /// Reducer for one metric name.
    #[must_use]
    pub fn with_reducer(mut self, metric: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.insert(metric.into(), reducer);
        self
    }

    fn reducer_for(&self, metric: &str) -> &Reducer {
        self.reducers.get(metric).unwrap_or(&self.default_reducer)
    }

    /// Read a trial's summary, or an empty one if nothing was recorded yet.
    ///
    /// # Errors
    ///
    /// Returns an error if `summary.json` exists but cannot be parsed.
    pub fn summary(&self, trial: &Trial) -> Result<MetricsSummary> {
        Ok(Self::load(&trial.summary_path())?.unwrap_or_else(|| MetricsSummary::new(trial.id())))
    }

    /// Read a summary file, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<MetricsSummary>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Record (or replace) the metrics of `stage` in the trial's summary.
    ///
    /// # Errors
    ///
    /// Returns `NonFiniteMetric` for NaN or infinite values, `TrialSealed`
    /// for sealed trials or finalized summaries, or a write error.
    pub fn record(
        &self,
        trial: &Trial,
        stage: &str,
        metrics: &BTreeMap<String, f64>,
    ) -> Result<MetricsSummary> {
        trial.ensure_writable()?;
        ensure_finite(stage, metrics)?;
        let mut summary = self.summary(trial)?;
        summary.upsert(stage, metrics.clone())?;
        Self::write(trial, &summary)?;
        tracing::debug!(trial = %trial.id(), stage, metrics = metrics.len(), "Metrics recorded");
        Ok(summary)
    }

    /// Compute the overall aggregate and seal the summary.
    ///
    /// Always writes `summary.json`, even when no stage reported metrics.
    ///
    /// # Errors
    ///
    /// Returns `TrialSealed` for sealed trials, `NonFiniteMetric` if a
    /// reducer yields NaN or infinity, or a write error.
    pub fn finalize(&self, trial: &Trial) -> Result<MetricsSummary> {
        trial.ensure_writable()?;
        let mut summary = self.summary(trial)?;
        if summary.is_sealed() {
            return Ok(summary);
        }

        let mut collected: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for stage in &summary.stages {
            for (metric, value) in &stage.values {
                collected.entry(metric.as_str()).or_default().push(*value);
            }
        }
        let overall: BTreeMap<String, f64> = collected
            .into_iter()
            .map(|(metric, values)| (metric.to_string(), self.reducer_for(metric).reduce(&values)))
            .collect();
        ensure_finite("overall", &overall)?;

        summary.seal(overall);
        Self::write(trial, &summary)?;
        Ok(summary)
    }

    fn write(trial: &Trial, summary: &MetricsSummary) -> Result<()> {
        let json = serde_json::to_vec_pretty(summary)?;
        TabularStore::write_file(trial.summary_path(), &json)
    }

    /// Leaderboard by one overall metric, best (highest) first.
    ///
    /// Summaries without the metric are left out; ties keep input order.
    #[must_use]
    pub fn rank(summaries: &[MetricsSummary], metric: &str) -> Vec<RankedTrial> {
        let mut ranked: Vec<RankedTrial> = summaries
            .iter()
            .filter_map(|summary| {
                summary.overall.get(metric).map(|value| RankedTrial {
                    trial_id: summary.trial_id.clone(),
                    value: *value,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Leaderboard of every finalized trial in a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project cannot be listed or a summary is unreadable.
    pub fn leaderboard(manager: &TrialManager, metric: &str) -> Result<Vec<RankedTrial>> {
        let mut summaries = Vec::new();
        for record in manager.list_trials()? {
            let path = manager
                .project_dir()
                .join(record.trial_id())
                .join(SUMMARY_FILE);
            if let Some(summary) = Self::load(&path)? {
                summaries.push(summary);
            }
        }
        Ok(Self::rank(&summaries, metric))
    }
}
