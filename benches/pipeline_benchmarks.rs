//! Pipeline benchmarks
//!
//! - Cached component resolution from the registry
//! - BM25 index build and scoring
//! - Parquet artifact round trip
//! - End-to-end retrieval trial
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use trueno_eval::config::{PipelineConfig, StageConfig};
use trueno_eval::dataset::{CorpusRow, Dataset, QuestionRow};
use trueno_eval::evaluator::Evaluator;
use trueno_eval::modules::Bm25Index;
use trueno_eval::registry::ModuleRegistry;
use trueno_eval::storage::TabularStore;

const WORDS: [&str; 12] = [
    "arrow", "parquet", "column", "vector", "tokio", "retrieval", "memory", "index", "query",
    "score", "trial", "stage",
];

/// Synthetic document `i`: six words picked deterministically
fn document(i: usize) -> String {
    (0..6)
        .map(|j| WORDS[(i * 7 + j * 5) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn corpus(size: usize) -> Dataset {
    let rows: Vec<CorpusRow> = (0..size)
        .map(|i| CorpusRow {
            doc_id: format!("d{i}"),
            contents: document(i),
            metadata: None,
        })
        .collect();
    Dataset::from_corpus(&rows).unwrap()
}

fn questions(size: usize) -> Dataset {
    let rows: Vec<QuestionRow> = (0..size)
        .map(|i| QuestionRow {
            qid: format!("q{i}"),
            query: document(i * 3),
            retrieval_gt: vec![format!("d{}", i * 3)],
            generation_gt: vec![],
        })
        .collect();
    Dataset::from_questions(&rows).unwrap()
}

/// Benchmark cached module resolution (hot path of every stage attempt)
fn bench_registry_resolve(c: &mut Criterion) {
    let registry = ModuleRegistry::with_builtins();
    registry.resolve_module("bm25").unwrap();

    c.bench_function("registry_resolve_cached", |b| {
        b.iter(|| {
            let module = registry.resolve_module(black_box("bm25")).unwrap();
            black_box(module);
        });
    });
}

/// Benchmark BM25 index build and query scoring
fn bench_bm25(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm25");

    for size in [1_000, 10_000].iter() {
        let docs: Vec<String> = (0..*size).map(document).collect();

        group.bench_with_input(BenchmarkId::new("build", size), size, |b, _| {
            b.iter(|| black_box(Bm25Index::new(&docs, 1.2, 0.75)));
        });

        let index = Bm25Index::new(&docs, 1.2, 0.75);
        group.bench_with_input(BenchmarkId::new("score", size), size, |b, _| {
            b.iter(|| black_box(index.scores(black_box("parquet column index"))));
        });
    }

    group.finish();
}

/// Benchmark writing and reloading a stage artifact
fn bench_artifact_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("artifact_roundtrip");
    let dir = TempDir::new().unwrap();

    for size in [1_000, 10_000, 100_000].iter() {
        let dataset = corpus(*size);
        let path = dir.path().join(format!("corpus_{size}.parquet"));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                TabularStore::write_parquet(&path, &dataset).unwrap();
                black_box(TabularStore::load_parquet(&path).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark a full bm25 + retrieval_eval trial
fn bench_retrieval_trial(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let evaluator = Evaluator::for_dataset(
        questions(200),
        Some(corpus(2_000)),
        dir.path().join("project"),
        Arc::new(ModuleRegistry::with_builtins()),
    );
    let config = PipelineConfig::new(vec![
        StageConfig::new("retrieval", "bm25").param("top_k", 10),
        StageConfig::new("evaluation", "retrieval_eval").param("k", 10),
    ]);

    let mut group = c.benchmark_group("retrieval_trial");
    group.sample_size(10);
    group.bench_function("bm25_200q_2000d", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(evaluator.start_trial_with(&config).await.unwrap());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_registry_resolve,
    bench_bm25,
    bench_artifact_roundtrip,
    bench_retrieval_trial
);
criterion_main!(benches);
