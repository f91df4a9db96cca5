//! Retrieval modules: `bm25` (lexical) and `vectordb` (dense)
//!
//! Both rank the corpus side input for every `query` and append
//! `retrieved_ids`, `retrieved_contents` and `retrieve_scores` (best first).
//! Ties keep corpus order.

use crate::component::{
    with_timeout, Capability, ComponentError, ComponentResult, ModuleContract, ParamKind,
    ParamSpec, StageInput, StageKind, StageModule, StageOutput,
};
use crate::dataset::{columns, float_list_array, string_list_array, Dataset, DatasetKind};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::time::Duration;
use trueno::Vector;

fn retrieval_contract() -> ModuleContract {
    ModuleContract::new(StageKind::Retrieval)
        .requires(SchemaSpec::new(vec![ColumnSpec::utf8(columns::QUERY)]))
        .produces(SchemaSpec::new(vec![
            ColumnSpec::string_list(columns::RETRIEVED_IDS),
            ColumnSpec::string_list(columns::RETRIEVED_CONTENTS),
            ColumnSpec::float_list(columns::RETRIEVE_SCORES),
        ]))
        .preserve_input()
        .needs_corpus(DatasetKind::Corpus.required_schema())
        .param(ParamSpec::with_default("top_k", ParamKind::PositiveInteger, 10))
}

/// Lowercased alphanumeric tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Indices of the `top_k` best scores, best first, ties in index order.
fn top_k(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

fn append_rankings(
    dataset: &Dataset,
    corpus_ids: &[String],
    corpus_contents: &[String],
    rankings: &[(Vec<usize>, Vec<f64>)],
) -> ComponentResult<Dataset> {
    let ids: Vec<Vec<String>> = rankings
        .iter()
        .map(|(idx, _)| idx.iter().map(|&i| corpus_ids[i].clone()).collect())
        .collect();
    let contents: Vec<Vec<String>> = rankings
        .iter()
        .map(|(idx, _)| idx.iter().map(|&i| corpus_contents[i].clone()).collect())
        .collect();
    let scores: Vec<Vec<f64>> = rankings.iter().map(|(_, s)| s.clone()).collect();
    Ok(dataset.with_columns(vec![
        (ColumnSpec::string_list(columns::RETRIEVED_IDS), string_list_array(&ids)),
        (ColumnSpec::string_list(columns::RETRIEVED_CONTENTS), string_list_array(&contents)),
        (ColumnSpec::float_list(columns::RETRIEVE_SCORES), float_list_array(&scores)),
    ])?)
}

/// Okapi BM25 index over a tokenized corpus.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    doc_terms: Vec<FxHashMap<String, u32>>,
    doc_lengths: Vec<f64>,
    avg_length: f64,
    idf: FxHashMap<String, f64>,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    /// Build an index; `k1` saturates term frequency, `b` normalizes length.
    #[must_use]
    pub fn new(documents: &[String], k1: f64, b: f64) -> Self {
        let doc_terms: Vec<FxHashMap<String, u32>> = documents
            .par_iter()
            .map(|doc| {
                let mut counts = FxHashMap::default();
                for token in tokenize(doc) {
                    *counts.entry(token).or_insert(0) += 1;
                }
                counts
            })
            .collect();
        let doc_lengths: Vec<f64> = doc_terms
            .iter()
            .map(|terms| f64::from(terms.values().sum::<u32>()))
            .collect();
        let avg_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<f64>() / doc_lengths.len() as f64
        };

        let mut df: FxHashMap<String, u32> = FxHashMap::default();
        for terms in &doc_terms {
            for term in terms.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let n = doc_terms.len() as f64;
        let idf = df
            .into_iter()
            .map(|(term, freq)| {
                let freq = f64::from(freq);
                (term, ((n - freq + 0.5) / (freq + 0.5) + 1.0).ln())
            })
            .collect();

        Self {
            doc_terms,
            doc_lengths,
            avg_length,
            idf,
            k1,
            b,
        }
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    /// Score every document against `query`.
    #[must_use]
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        self.doc_terms
            .iter()
            .zip(&self.doc_lengths)
            .map(|(doc, &length)| {
                terms
                    .iter()
                    .filter_map(|term| {
                        let tf = f64::from(*doc.get(term)?);
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        let norm = if self.avg_length > 0.0 {
                            1.0 - self.b + self.b * length / self.avg_length
                        } else {
                            1.0
                        };
                        Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Lexical retrieval with Okapi BM25.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bm25Retriever;

impl Bm25Retriever {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        retrieval_contract()
            .param(ParamSpec::with_default("k1", ParamKind::Float, 1.2))
            .param(ParamSpec::with_default("b", ParamKind::Float, 0.75))
    }
}

#[async_trait]
impl StageModule for Bm25Retriever {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let corpus = input.require_corpus()?;
        let k = input.usize_param("top_k")?;
        let corpus_ids = corpus.strings(columns::DOC_ID)?;
        let corpus_contents = corpus.strings(columns::CONTENTS)?;
        let queries = input.dataset.strings(columns::QUERY)?;

        let index = Bm25Index::new(&corpus_contents, input.f64_param("k1")?, input.f64_param("b")?);
        let rankings: Vec<(Vec<usize>, Vec<f64>)> = queries
            .par_iter()
            .map(|query| {
                let scores = index.scores(query);
                let best = top_k(&scores, k);
                let best_scores = best.iter().map(|&i| scores[i]).collect();
                (best, best_scores)
            })
            .collect();

        let dataset = append_rankings(input.dataset, &corpus_ids, &corpus_contents, &rankings)?;
        Ok(StageOutput::new(dataset))
    }
}

/// Cosine similarity with SIMD dot products; zero vectors score 0.
///
/// # Errors
///
/// Returns a fatal error when dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> ComponentResult<f64> {
    if a.len() != b.len() {
        return Err(ComponentError::fatal(format!(
            "embedding dimensions differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    let va = Vector::from_slice(a);
    let vb = Vector::from_slice(b);
    let dot = va.dot(&vb).map_err(kernel_error)?;
    let norm = (va.dot(&va).map_err(kernel_error)? * vb.dot(&vb).map_err(kernel_error)?).sqrt();
    if norm == 0.0 {
        Ok(0.0)
    } else {
        Ok(f64::from(dot / norm))
    }
}

fn kernel_error(e: impl std::fmt::Display) -> ComponentError {
    ComponentError::fatal(format!("vector kernel failed: {e}"))
}

/// Dense retrieval with the embedding model named by `embedding`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorDbRetriever;

impl VectorDbRetriever {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        retrieval_contract()
            .param(ParamSpec::required(
                "embedding",
                ParamKind::Component(Capability::Embedding),
            ))
            .param(ParamSpec::with_default("timeout_secs", ParamKind::PositiveInteger, 120))
    }
}

#[async_trait]
impl StageModule for VectorDbRetriever {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let corpus = input.require_corpus()?;
        let k = input.usize_param("top_k")?;
        let timeout = Duration::from_secs(input.usize_param("timeout_secs")? as u64);
        let model = input.resources.resolve_embedding(input.str_param("embedding")?)?;

        let corpus_ids = corpus.strings(columns::DOC_ID)?;
        let corpus_contents = corpus.strings(columns::CONTENTS)?;
        let queries = input.dataset.strings(columns::QUERY)?;

        let doc_vectors = with_timeout(timeout, model.embed_batch(&corpus_contents)).await?;
        let query_vectors = with_timeout(timeout, model.embed_batch(&queries)).await?;

        let rankings = query_vectors
            .par_iter()
            .map(|query| -> ComponentResult<(Vec<usize>, Vec<f64>)> {
                let scores = doc_vectors
                    .iter()
                    .map(|doc| cosine_similarity(query, doc))
                    .collect::<ComponentResult<Vec<f64>>>()?;
                let best = top_k(&scores, k);
                let best_scores = best.iter().map(|&i| scores[i]).collect();
                Ok((best, best_scores))
            })
            .collect::<ComponentResult<Vec<(Vec<usize>, Vec<f64>)>>>()?;

        let dataset = append_rankings(input.dataset, &corpus_ids, &corpus_contents, &rankings)?;
        Ok(StageOutput::new(dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "Rust guarantees memory safety without a garbage collector".to_string(),
            "Parquet is a columnar storage format".to_string(),
            "Arrow defines a columnar memory format".to_string(),
        ]
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, World! 42x"), vec!["hello", "world", "42x"]);
    }

    #[test]
    fn test_bm25_prefers_matching_document() {
        let index = Bm25Index::new(&corpus(), 1.2, 0.75);
        let scores = index.scores("parquet storage");
        assert_eq!(top_k(&scores, 1), vec![1]);
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn test_top_k_ties_keep_corpus_order() {
        assert_eq!(top_k(&[0.0, 1.0, 1.0, 0.5], 3), vec![1, 2, 3]);
        assert_eq!(top_k(&[0.3], 5), vec![0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
    }
}
