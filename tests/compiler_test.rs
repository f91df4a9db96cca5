//! Integration tests for configuration compilation
//!
//! Compile-time errors must surface before the project directory is touched
//! and before any component is constructed.

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use trueno_eval::component::Capability;
use trueno_eval::config::{parse_config_str, PipelineConfig, StageConfig};
use trueno_eval::dataset::{CorpusRow, Dataset, QuestionRow};
use trueno_eval::evaluator::Evaluator;
use trueno_eval::registry::ModuleRegistry;
use trueno_eval::Error;

fn questions() -> Dataset {
    Dataset::from_questions(&[QuestionRow {
        qid: "q1".into(),
        query: "what stores columns".into(),
        retrieval_gt: vec!["d1".into()],
        generation_gt: vec!["parquet".into()],
    }])
    .unwrap()
}

fn corpus() -> Dataset {
    Dataset::from_corpus(&[CorpusRow {
        doc_id: "d1".into(),
        contents: "Parquet stores columns".into(),
        metadata: None,
    }])
    .unwrap()
}

fn evaluator(dir: &TempDir, with_corpus: bool) -> (Evaluator, Arc<ModuleRegistry>) {
    let registry = Arc::new(ModuleRegistry::with_builtins());
    let evaluator = Evaluator::for_dataset(
        questions(),
        with_corpus.then(corpus),
        dir.path().join("project"),
        Arc::clone(&registry),
    );
    (evaluator, registry)
}

#[tokio::test]
async fn test_schema_mismatch_creates_no_trial() {
    let dir = TempDir::new().unwrap();
    let (evaluator, registry) = evaluator(&dir, true);
    let config = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25"),
        StageConfig::new("evaluation", "generation_eval"),
    ]);

    let err = evaluator.start_trial_with(&config).await.unwrap_err();
    match &err {
        Error::SchemaMismatch {
            upstream,
            downstream,
            missing,
        } => {
            assert_eq!(upstream, "retrieval");
            assert_eq!(downstream, "evaluation");
            assert!(missing.iter().any(|m| m.starts_with("generated_texts")));
        }
        other => panic!("expected SchemaMismatch, got {other}"),
    }
    assert!(err.is_compile_time());
    assert!(!dir.path().join("project").exists());
    assert_eq!(registry.construction_count(), 0);
}

#[tokio::test]
async fn test_missing_corpus_creates_no_trial() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, false);
    let config = PipelineConfig::new(vec![StageConfig::new("retrieval", "bm25")]);

    let err = evaluator.start_trial_with(&config).await.unwrap_err();
    assert!(matches!(&err, Error::SchemaMismatch { upstream, .. } if upstream == "corpus"));
    assert!(!dir.path().join("project").exists());
}

#[test]
fn test_unknown_module() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, true);
    let config = PipelineConfig::new(vec![StageConfig::new("retrieval", "colbert")]);

    let err = evaluator.compile(&config).unwrap_err();
    assert!(matches!(
        &err,
        Error::UnknownComponent { capability: Capability::Module, name, .. } if name == "colbert"
    ));
}

#[test]
fn test_unknown_resource_reference() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, true);
    let config = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "vectordb").param("embedding", "flagembed_large")
    ]);

    let err = evaluator.compile(&config).unwrap_err();
    match err {
        Error::UnknownComponent {
            stage,
            capability,
            name,
        } => {
            assert_eq!(stage, "retrieval");
            assert_eq!(capability, Capability::Embedding);
            assert_eq!(name, "flagembed_large");
        }
        other => panic!("expected UnknownComponent, got {other}"),
    }
}

#[test]
fn test_invalid_parameters() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, true);

    let wrong_type = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25").param("top_k", "ten")
    ]);
    let err = evaluator.compile(&wrong_type).unwrap_err();
    assert!(matches!(&err, Error::InvalidParameter { reason, .. } if reason.contains("top_k")));

    let unknown = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25").param("top_n", 3)
    ]);
    let err = evaluator.compile(&unknown).unwrap_err();
    assert!(matches!(&err, Error::InvalidParameter { reason, .. } if reason.contains("top_n")));

    let missing = PipelineConfig::new(vec![StageConfig::new("retrieval", "vectordb")]);
    let err = evaluator.compile(&missing).unwrap_err();
    assert!(
        matches!(&err, Error::InvalidParameter { reason, .. } if reason.contains("embedding"))
    );
}

#[test]
fn test_yaml_pipeline_compiles() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, true);
    let config = parse_config_str(
        r"
name: bm25_baseline
retry:
  max_retries: 1
stages:
  - stage: retrieval
    module: bm25
    params:
      top_k: 2
  - stage: evaluation
    name: scores
    module: retrieval_eval
    params:
      k: 2
      metrics: [hit, mrr]
",
    )
    .unwrap();

    let plan = evaluator.compile(&config).unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.retry().max_retries, 1);
    assert_eq!(plan.stages()[1].name(), "scores");
    assert_eq!(plan.stages()[1].artifact_file_name(), "01-scores.parquet");
    assert!(plan.output_schema().unwrap().contains("reciprocal_rank"));
    // bm25 defaults are part of the resolved configuration
    assert_eq!(plan.config().stages[0].params["k1"], 1.2);
}

#[tokio::test]
async fn test_config_file_errors_create_no_trial() {
    let dir = TempDir::new().unwrap();
    let (evaluator, _) = evaluator(&dir, true);
    let path = dir.path().join("pipeline.yaml");
    fs::write(
        &path,
        "stages:\n  - stage: retrieval\n    module: ${TE_COMPILER_TEST_UNSET_MODULE}\n",
    )
    .unwrap();

    let err = evaluator.start_trial(&path).await.unwrap_err();
    assert!(matches!(&err, Error::Config(msg) if msg.contains("TE_COMPILER_TEST_UNSET_MODULE")));
    assert!(!dir.path().join("project").exists());
}
