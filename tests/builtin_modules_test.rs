//! End-to-end tests of the built-in modules through the evaluator facade
//!
//! External services (embedding model, language model) are replaced by
//! deterministic in-process components.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use trueno_eval::component::{ComponentResult, EmbeddingModel, Generator, Params};
use trueno_eval::config::{PipelineConfig, RetryConfig, StageConfig};
use trueno_eval::dataset::{columns, file_listing, CorpusRow, Dataset, QuestionRow};
use trueno_eval::evaluator::Evaluator;
use trueno_eval::registry::{LazyInit, ModuleRegistry};
use trueno_eval::storage::TabularStore;
use trueno_eval::trial::TrialStatus;

const DOCS: [(&str, &str); 3] = [
    ("d1", "Rust guarantees memory safety"),
    ("d2", "Parquet is a columnar storage format"),
    ("d3", "Tokio is an asynchronous runtime"),
];

const QUERIES: [(&str, &str, &str); 3] = [
    ("q1", "memory safety in rust", "d1"),
    ("q2", "parquet columnar storage", "d2"),
    ("q3", "tokio asynchronous runtime", "d3"),
];

/// One dimension per keyword.
struct KeywordEmbedding;

#[async_trait]
impl EmbeddingModel for KeywordEmbedding {
    async fn embed(&self, text: &str) -> ComponentResult<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(["rust", "parquet", "tokio"]
            .iter()
            .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
            .collect())
    }
}

/// Answers with the first line of the context block.
struct ContextEcho;

#[async_trait]
impl Generator for ContextEcho {
    async fn generate(&self, prompt: &str, params: &Params) -> ComponentResult<String> {
        assert!(params.contains_key("temperature"));
        assert!(!params.contains_key("llm"));
        Ok(prompt
            .strip_prefix("Context: ")
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default()
            .to_string())
    }
}

/// Writes a QA pair about the passage, except for passages mentioning Beta.
struct ScriptedQa;

#[async_trait]
impl Generator for ScriptedQa {
    async fn generate(&self, prompt: &str, _params: &Params) -> ComponentResult<String> {
        let passage = prompt.rsplit("Passage:\n").next().unwrap_or_default();
        if passage.contains("Beta") {
            return Ok("I cannot answer that.".to_string());
        }
        Ok(format!("Question: What does the text say?\nAnswer: {passage}"))
    }
}

fn write_inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let corpus = Dataset::from_corpus(
        &DOCS
            .iter()
            .map(|(id, text)| CorpusRow {
                doc_id: (*id).to_string(),
                contents: (*text).to_string(),
                metadata: None,
            })
            .collect::<Vec<_>>(),
    )
    .unwrap();
    let questions = Dataset::from_questions(
        &QUERIES
            .iter()
            .map(|(qid, query, gt)| QuestionRow {
                qid: (*qid).to_string(),
                query: (*query).to_string(),
                retrieval_gt: vec![(*gt).to_string()],
                generation_gt: vec![DOCS
                    .iter()
                    .find(|(id, _)| id == gt)
                    .map(|(_, text)| (*text).to_string())
                    .unwrap_or_default()],
            })
            .collect::<Vec<_>>(),
    )
    .unwrap();

    let qa_path = dir.join("qa.parquet");
    let corpus_path = dir.join("corpus.parquet");
    TabularStore::write_parquet(&qa_path, &questions).unwrap();
    TabularStore::write_parquet(&corpus_path, &corpus).unwrap();
    (qa_path, corpus_path)
}

fn registry() -> Arc<ModuleRegistry> {
    let registry = ModuleRegistry::with_builtins();
    registry.register("keywords", LazyInit::embedding(|_| Ok(KeywordEmbedding)));
    registry.register("context_echo", LazyInit::generator(|_| Ok(ContextEcho)));
    registry.register("scripted_qa", LazyInit::generator(|_| Ok(ScriptedQa)));
    Arc::new(registry)
}

fn evaluator(dir: &TempDir) -> Evaluator {
    let (qa, corpus) = write_inputs(dir.path());
    Evaluator::new(qa, corpus, dir.path().join("project"), registry()).unwrap()
}

#[tokio::test]
async fn test_bm25_pipeline_from_yaml() {
    let dir = TempDir::new().unwrap();
    let evaluator = evaluator(&dir);
    let config_path = dir.path().join("bm25.yaml");
    fs::write(
        &config_path,
        "name: bm25
stages:
  - stage: retrieval
    module: bm25
    params:
      top_k: 2
  - stage: evaluation
    module: retrieval_eval
    params:
      k: 1
",
    )
    .unwrap();

    let summary = evaluator.start_trial(&config_path).await.unwrap();
    assert_eq!(summary.trial_id(), "bm25_0");
    assert!((summary.overall()["hit@1"] - 1.0).abs() < 1e-6);
    assert!((summary.overall()["mrr"] - 1.0).abs() < 1e-6);

    let trial = evaluator.trial_manager().open("bm25_0").unwrap();
    assert_eq!(trial.status(), TrialStatus::Success);
    let retrieved = TabularStore::load_parquet(trial.dir().join("00-retrieval.parquet")).unwrap();
    let ids = retrieved.string_lists(columns::RETRIEVED_IDS).unwrap();
    assert!(ids.iter().all(|row| row.len() == 2));
    assert_eq!(ids[1][0], "d2");
    assert_eq!(retrieved.float_lists(columns::RETRIEVE_SCORES).unwrap()[0].len(), 2);
}

#[tokio::test]
async fn test_vectordb_and_bm25_trials_on_leaderboard() {
    let dir = TempDir::new().unwrap();
    let evaluator = evaluator(&dir);

    let dense = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "vectordb")
            .param("embedding", "keywords")
            .param("top_k", 3),
        StageConfig::new("evaluation", "retrieval_eval").param("k", 1),
    ]);
    let lexical = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25").param("top_k", 3),
        StageConfig::new("evaluation", "retrieval_eval").param("k", 3),
    ]);

    let dense_summary = evaluator.start_trial_with(&dense).await.unwrap();
    let lexical_summary = evaluator.start_trial_with(&lexical).await.unwrap();
    assert!((dense_summary.overall()["hit@1"] - 1.0).abs() < 1e-6);
    assert!((lexical_summary.overall()["recall@3"] - 1.0).abs() < 1e-6);

    let board = evaluator.leaderboard("mrr").unwrap();
    assert_eq!(board.len(), 2);
    assert!(board.iter().all(|row| (row.value - 1.0).abs() < 1e-6));
}

#[tokio::test]
async fn test_generation_pipeline_scores_answers() {
    let dir = TempDir::new().unwrap();
    let evaluator = evaluator(&dir);
    let config = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25").param("top_k", 1),
        StageConfig::new("prompt_maker", "fstring")
            .param("prompt", "Context: {retrieved_contents}\nQuestion: {query}"),
        StageConfig::new("generation", "llm_generator")
            .param("llm", "context_echo")
            .param("temperature", 0.0),
        StageConfig::new("evaluation", "generation_eval"),
    ])
    .with_retry(RetryConfig {
        max_retries: 0,
        base_backoff_ms: 1,
        max_backoff_ms: 1,
    });

    let summary = evaluator.start_trial_with(&config).await.unwrap();
    assert!((summary.overall()["exact_match"] - 1.0).abs() < 1e-6);
    assert!((summary.overall()["token_f1"] - 1.0).abs() < 1e-6);

    let trial = evaluator.trial_manager().open(summary.trial_id()).unwrap();
    assert_eq!(trial.record().artifacts().len(), 4);
    let prompts = TabularStore::load_parquet(trial.dir().join("01-prompt_maker.parquet"))
        .unwrap()
        .strings(columns::PROMPTS)
        .unwrap();
    assert_eq!(
        prompts[0],
        "Context: Rust guarantees memory safety\nQuestion: memory safety in rust"
    );
}

#[tokio::test]
async fn test_parse_chunk_and_qa_generation() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("alpha.txt"), "Alpha one. Alpha two.").unwrap();
    fs::write(docs.join("beta.txt"), "Beta one.").unwrap();

    let listing = file_listing(&format!("{}/*.txt", docs.display())).unwrap();
    assert_eq!(listing.num_rows(), 2);
    let evaluator =
        Evaluator::for_dataset(listing, None, dir.path().join("project"), registry());
    let config = PipelineConfig::new(vec![
        StageConfig::new("parse", "plain_text"),
        StageConfig::new("chunk", "split_chunk"),
        StageConfig::new("qa_generation", "llm_qa").param("llm", "scripted_qa"),
    ]);

    let summary = evaluator.start_trial_with(&config).await.unwrap();
    assert!(summary.overall().is_empty());

    let trial = evaluator.trial_manager().open(summary.trial_id()).unwrap();
    let chunks = TabularStore::load_parquet(trial.dir().join("01-chunk.parquet")).unwrap();
    assert_eq!(
        chunks.strings(columns::CONTENTS).unwrap(),
        vec!["Alpha one", "Alpha two", "Beta one"]
    );
    assert_eq!(chunks.u64s(columns::START_IDX).unwrap(), vec![0, 11, 0]);

    let qa = TabularStore::load_parquet(trial.dir().join("02-qa_generation.parquet")).unwrap();
    assert_eq!(qa.strings(columns::QID).unwrap(), vec!["q-alpha-0", "q-alpha-1"]);
    assert_eq!(
        qa.string_lists(columns::RETRIEVAL_GT).unwrap(),
        vec![vec!["alpha-0".to_string()], vec!["alpha-1".to_string()]]
    );
    assert_eq!(
        qa.string_lists(columns::GENERATION_GT).unwrap()[1],
        vec!["Alpha two".to_string()]
    );
}
