//! Retrieval Trial Example
//!
//! Compares a lexical (bm25) and a dense (vectordb) retrieval pipeline on a
//! tiny corpus and prints the resulting leaderboard.
//!
//! Run with: cargo run --example retrieval_trial

use async_trait::async_trait;
use std::sync::Arc;
use trueno_eval::component::{ComponentResult, EmbeddingModel};
use trueno_eval::config::{PipelineConfig, StageConfig};
use trueno_eval::dataset::{corpus_from_text_lines, Dataset, QuestionRow};
use trueno_eval::evaluator::Evaluator;
use trueno_eval::registry::{LazyInit, ModuleRegistry};

const CORPUS: &str = "\
Arrow is a columnar in-memory format
Parquet stores columns on disk with compression
Tokio schedules asynchronous tasks on a thread pool
BM25 ranks documents by term frequency and rarity
Embeddings map text to dense vectors
";

/// Bag-of-letters embedding, enough to make dense retrieval non-trivial.
struct LetterHistogram;

#[async_trait]
impl EmbeddingModel for LetterHistogram {
    async fn embed(&self, text: &str) -> ComponentResult<Vec<f32>> {
        let mut histogram = vec![0.0f32; 26];
        for byte in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
            histogram[usize::from(byte - b'a')] += 1.0;
        }
        Ok(histogram)
    }
}

fn questions() -> Dataset {
    let rows = [
        ("q0", "which format is columnar in memory", "line_0"),
        ("q1", "how are columns stored on disk", "line_1"),
        ("q2", "what schedules asynchronous tasks", "line_2"),
        ("q3", "how does bm25 rank documents", "line_3"),
    ]
    .map(|(qid, query, gt)| QuestionRow {
        qid: qid.to_string(),
        query: query.to_string(),
        retrieval_gt: vec![gt.to_string()],
        generation_gt: vec![],
    });
    Dataset::from_questions(&rows).expect("valid questions")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    trueno_eval::logging::init("info");
    println!("=== Trueno-Eval Retrieval Trial ===\n");

    let registry = ModuleRegistry::with_builtins();
    registry.register("letters", LazyInit::embedding(|_| Ok(LetterHistogram)));

    let project = tempfile::tempdir()?;
    let evaluator = Evaluator::for_dataset(
        questions(),
        Some(corpus_from_text_lines(CORPUS)?),
        project.path(),
        Arc::new(registry),
    );

    // -------------------------------------------------------------------------
    // 1. Run one trial per retrieval strategy
    // -------------------------------------------------------------------------
    let pipelines = [
        PipelineConfig::new(vec![
            StageConfig::new("retrieval", "bm25").param("top_k", 3),
            StageConfig::new("evaluation", "retrieval_eval").param("k", 3),
        ])
        .named("bm25"),
        PipelineConfig::new(vec![
            StageConfig::new("retrieval", "vectordb")
                .param("embedding", "letters")
                .param("top_k", 3),
            StageConfig::new("evaluation", "retrieval_eval").param("k", 3),
        ])
        .named("letters"),
    ];

    for config in &pipelines {
        let summary = evaluator.start_trial_with(config).await?;
        println!("Trial {}:", summary.trial_id());
        for (metric, value) in summary.overall() {
            println!("   {metric:<10} {value:.3}");
        }
    }

    // -------------------------------------------------------------------------
    // 2. Rank trials
    // -------------------------------------------------------------------------
    println!("\nLeaderboard (mrr):");
    for (rank, row) in evaluator.leaderboard("mrr")?.iter().enumerate() {
        println!("   {}. {:<12} {:.3}", rank + 1, row.trial_id, row.value);
    }

    println!("\nArtifacts kept under {}", project.path().display());
    Ok(())
}
