//! Evaluation modules
//!
//! Both append one score column per row metric and report the mean over all
//! rows as stage metrics. A zero-row input reports no metrics.
//!
//! ```text
//! retrieval_eval   : retrieval_gt, retrieved_ids  -> hit, recall, reciprocal_rank
//!                    summary keys hit@{k}, recall@{k}, mrr
//! generation_eval  : generation_gt, generated_texts -> exact_match, token_f1
//! ```

use crate::component::{
    ComponentResult, ModuleContract, ParamKind, ParamSpec, StageInput, StageKind, StageModule,
    StageOutput,
};
use crate::dataset::{columns, float64_array};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

/// Per-row hit column.
pub const HIT: &str = "hit";
/// Per-row recall column.
pub const RECALL: &str = "recall";
/// Per-row reciprocal rank column.
pub const RECIPROCAL_RANK: &str = "reciprocal_rank";
/// Per-row exact match column.
pub const EXACT_MATCH: &str = "exact_match";
/// Per-row token F1 column.
pub const TOKEN_F1: &str = "token_f1";

const RETRIEVAL_METRICS: &[&str] = &["hit", "recall", "mrr"];
const GENERATION_METRICS: &[&str] = &[EXACT_MATCH, TOKEN_F1];

/// Arithmetic mean in f64; empty input is 0.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Scores of one ranked list against its ground truth, within the first `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalScores {
    /// 1.0 if any relevant id is in the first `k`
    pub hit: f64,
    /// Share of relevant ids found in the first `k`
    pub recall: f64,
    /// 1 / rank of the first relevant id in the first `k`, else 0
    pub reciprocal_rank: f64,
}

/// Score one retrieval result.
#[must_use]
pub fn score_retrieval(ground_truth: &[String], retrieved: &[String], k: usize) -> RetrievalScores {
    let relevant: HashSet<&str> = ground_truth.iter().map(String::as_str).collect();
    let top = &retrieved[..k.min(retrieved.len())];
    let found = top.iter().filter(|id| relevant.contains(id.as_str())).count();
    let first = top.iter().position(|id| relevant.contains(id.as_str()));
    RetrievalScores {
        hit: if found > 0 { 1.0 } else { 0.0 },
        recall: if relevant.is_empty() {
            0.0
        } else {
            found.min(relevant.len()) as f64 / relevant.len() as f64
        },
        reciprocal_rank: first.map_or(0.0, |rank| 1.0 / (rank + 1) as f64),
    }
}

/// Retrieval quality at cut-off `k`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalEvaluator;

impl RetrievalEvaluator {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::Evaluation)
            .requires(SchemaSpec::new(vec![
                ColumnSpec::string_list(columns::RETRIEVAL_GT),
                ColumnSpec::string_list(columns::RETRIEVED_IDS),
            ]))
            .produces(SchemaSpec::new(vec![
                ColumnSpec::float64(HIT),
                ColumnSpec::float64(RECALL),
                ColumnSpec::float64(RECIPROCAL_RANK),
            ]))
            .preserve_input()
            .param(ParamSpec::with_default("k", ParamKind::PositiveInteger, 10))
            .param(ParamSpec::with_default(
                "metrics",
                ParamKind::Subset(RETRIEVAL_METRICS),
                serde_json::json!(RETRIEVAL_METRICS),
            ))
    }
}

#[async_trait]
impl StageModule for RetrievalEvaluator {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let k = input.usize_param("k")?;
        let selected = input.str_list_param("metrics")?;
        let ground_truth = input.dataset.string_lists(columns::RETRIEVAL_GT)?;
        let retrieved = input.dataset.string_lists(columns::RETRIEVED_IDS)?;

        let scores: Vec<RetrievalScores> = ground_truth
            .iter()
            .zip(&retrieved)
            .map(|(gt, ids)| score_retrieval(gt, ids, k))
            .collect();
        let hits: Vec<f64> = scores.iter().map(|s| s.hit).collect();
        let recalls: Vec<f64> = scores.iter().map(|s| s.recall).collect();
        let ranks: Vec<f64> = scores.iter().map(|s| s.reciprocal_rank).collect();

        let mut metrics = BTreeMap::new();
        if !scores.is_empty() {
            for name in &selected {
                let (key, values) = match name.as_str() {
                    "hit" => (format!("hit@{k}"), &hits),
                    "recall" => (format!("recall@{k}"), &recalls),
                    _ => ("mrr".to_string(), &ranks),
                };
                metrics.insert(key, mean(values));
            }
        }

        let dataset = input.dataset.with_columns(vec![
            (ColumnSpec::float64(HIT), float64_array(hits)),
            (ColumnSpec::float64(RECALL), float64_array(recalls)),
            (ColumnSpec::float64(RECIPROCAL_RANK), float64_array(ranks)),
        ])?;
        Ok(StageOutput::with_metrics(dataset, metrics))
    }
}

fn normalize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// 1.0 if the normalized answer equals any normalized reference.
#[must_use]
pub fn exact_match(answer: &str, references: &[String]) -> f64 {
    let answer = normalize(answer);
    if references.iter().any(|r| normalize(r) == answer) {
        1.0
    } else {
        0.0
    }
}

/// Best token-overlap F1 against the references.
#[must_use]
pub fn token_f1(answer: &str, references: &[String]) -> f64 {
    let answer = normalize(answer);
    references
        .iter()
        .map(|reference| {
            let reference = normalize(reference);
            let mut remaining = reference.clone();
            let mut common = 0usize;
            for token in &answer {
                if let Some(pos) = remaining.iter().position(|r| r == token) {
                    remaining.swap_remove(pos);
                    common += 1;
                }
            }
            if common == 0 {
                return 0.0;
            }
            let precision = common as f64 / answer.len() as f64;
            let recall = common as f64 / reference.len() as f64;
            2.0 * precision * recall / (precision + recall)
        })
        .fold(0.0, f64::max)
}

/// Answer quality against `generation_gt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationEvaluator;

impl GenerationEvaluator {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::Evaluation)
            .requires(SchemaSpec::new(vec![
                ColumnSpec::string_list(columns::GENERATION_GT),
                ColumnSpec::utf8(columns::GENERATED_TEXTS),
            ]))
            .produces(SchemaSpec::new(vec![
                ColumnSpec::float64(EXACT_MATCH),
                ColumnSpec::float64(TOKEN_F1),
            ]))
            .preserve_input()
            .param(ParamSpec::with_default(
                "metrics",
                ParamKind::Subset(GENERATION_METRICS),
                serde_json::json!(GENERATION_METRICS),
            ))
    }
}

#[async_trait]
impl StageModule for GenerationEvaluator {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let selected = input.str_list_param("metrics")?;
        let references = input.dataset.string_lists(columns::GENERATION_GT)?;
        let answers = input.dataset.strings(columns::GENERATED_TEXTS)?;

        let em: Vec<f64> = answers
            .iter()
            .zip(&references)
            .map(|(a, r)| exact_match(a, r))
            .collect();
        let f1: Vec<f64> = answers
            .iter()
            .zip(&references)
            .map(|(a, r)| token_f1(a, r))
            .collect();

        let mut metrics = BTreeMap::new();
        if !answers.is_empty() {
            for name in &selected {
                let values = if name == EXACT_MATCH { &em } else { &f1 };
                metrics.insert(name.clone(), mean(values));
            }
        }

        let dataset = input.dataset.with_columns(vec![
            (ColumnSpec::float64(EXACT_MATCH), float64_array(em)),
            (ColumnSpec::float64(TOKEN_F1), float64_array(f1)),
        ])?;
        Ok(StageOutput::with_metrics(dataset, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_score_retrieval_hit_at_1() {
        let s = score_retrieval(&ids(&["d1"]), &ids(&["d1", "d2"]), 1);
        assert_eq!(s.hit, 1.0);
        assert_eq!(s.reciprocal_rank, 1.0);
        let miss = score_retrieval(&ids(&["d2"]), &ids(&["d1", "d2"]), 1);
        assert_eq!(miss.hit, 0.0);
        assert_eq!(miss.reciprocal_rank, 0.0);
    }

    #[test]
    fn test_recall_and_rank_within_k() {
        let s = score_retrieval(&ids(&["d2", "d3"]), &ids(&["d1", "d2", "d3"]), 2);
        assert_eq!(s.recall, 0.5);
        assert_eq!(s.reciprocal_rank, 0.5);
    }

    #[test]
    fn test_empty_ground_truth() {
        let s = score_retrieval(&[], &ids(&["d1"]), 3);
        assert_eq!((s.hit, s.recall), (0.0, 0.0));
    }

    #[test]
    fn test_exact_match_normalizes() {
        assert_eq!(exact_match("Paris.", &ids(&["paris"])), 1.0);
        assert_eq!(exact_match("Lyon", &ids(&["paris"])), 0.0);
    }

    #[test]
    fn test_token_f1() {
        let f1 = token_f1("the capital is paris", &ids(&["paris is the capital of france"]));
        let expected = 2.0 * 1.0 * (4.0 / 6.0) / (1.0 + 4.0 / 6.0);
        assert!((f1 - expected).abs() < 1e-12);
        assert_eq!(token_f1("nothing", &ids(&["paris"])), 0.0);
        assert_eq!(token_f1("x", &[]), 0.0);
    }

    #[test]
    fn test_mean() {
        assert!((mean(&[1.0, 0.0, 1.0]) - 2.0 / 3.0).abs() < 1e-15);
        assert!((mean(&[0.1; 10]) - 0.1).abs() < 1e-15);
        assert_eq!(mean(&[]), 0.0);
    }
}
