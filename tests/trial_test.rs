//! Integration tests for trial directories and the metrics leaderboard

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use trueno_eval::config::{PipelineConfig, StageConfig};
use trueno_eval::metrics::{MetricsAggregator, Reducer};
use trueno_eval::trial::{TrialManager, TrialStatus, CONFIG_FILE, RECORD_FILE, SUMMARY_FILE};
use trueno_eval::Error;

fn config() -> PipelineConfig {
    PipelineConfig::new(vec![StageConfig::new("retrieval", "bm25").param("top_k", 3)])
}

fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

#[test]
fn test_sequential_trials_get_increasing_ids() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path().join("project"));

    let first = manager.start_trial(&config()).unwrap();
    let second = manager.start_trial(&config()).unwrap();
    assert_eq!(first.id(), "0");
    assert_eq!(second.id(), "1");
    assert_ne!(first.dir(), second.dir());

    for trial in [&first, &second] {
        assert!(trial.dir().join(CONFIG_FILE).exists());
        assert!(trial.dir().join(RECORD_FILE).exists());
        assert_eq!(trial.status(), TrialStatus::Pending);
        assert_eq!(trial.frozen_config().unwrap(), config());
    }
}

#[test]
fn test_named_trials_use_name_prefix() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());

    let a = manager.start_trial(&config().named("bm25")).unwrap();
    let b = manager.start_trial(&config().named("bm25")).unwrap();
    let c = manager.start_trial(&config()).unwrap();
    assert_eq!(a.id(), "bm25_0");
    assert_eq!(b.id(), "bm25_1");
    assert_eq!(c.id(), "0");
    assert_eq!(a.record().name(), Some("bm25"));
}

#[test]
fn test_invalid_name_is_trial_creation_error() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());
    let err = manager.start_trial(&config().named("../outside")).unwrap_err();
    assert!(matches!(err, Error::TrialCreation { .. }));
}

#[test]
fn test_uncreatable_project_dir_is_trial_creation_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "plain file").unwrap();
    let project = blocker.join("project");
    let manager = TrialManager::new(project.clone());

    let err = manager.start_trial(&config()).unwrap_err();
    match err {
        Error::TrialCreation { path, .. } => assert_eq!(path, project),
        other => panic!("expected TrialCreation, got {other}"),
    }
    assert!(!project.exists());
    assert!(blocker.is_file());
}

#[test]
fn test_concurrent_trials_never_share_a_directory() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(TrialManager::new(dir.path().join("project")));

    let ids: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let manager = Arc::clone(&manager);
                scope.spawn(move || manager.start_trial(&config()).unwrap().id().to_string())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), 12);
    assert_eq!(manager.list_trials().unwrap().len(), 12);
}

#[test]
fn test_open_and_list_trials() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());
    let trial = manager.start_trial(&config()).unwrap();
    std::fs::create_dir(dir.path().join("not-a-trial")).unwrap();

    let reopened = manager.open(trial.id()).unwrap();
    assert_eq!(reopened.record(), trial.record());

    let listed = manager.list_trials().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].trial_id(), "0");

    assert!(manager.open("42").is_err());
    assert!(manager.open("../0").is_err());
}

#[test]
fn test_sealed_trial_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());
    let mut trial = manager.start_trial(&config()).unwrap();
    trial.start().unwrap();
    trial.complete(TrialStatus::Success, None).unwrap();
    trial.seal().unwrap();

    assert!(matches!(trial.start(), Err(Error::TrialSealed(_))));
    let aggregator = MetricsAggregator::new();
    let err = aggregator
        .record(&trial, "evaluation", &metrics(&[("mrr", 0.5)]))
        .unwrap_err();
    assert!(matches!(err, Error::TrialSealed(_)));

    let reopened = manager.open(trial.id()).unwrap();
    assert!(reopened.is_sealed());
    assert!(reopened.record().ended_at().is_some());
}

#[test]
fn test_finalize_reduces_across_stages() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());
    let trial = manager.start_trial(&config()).unwrap();
    let aggregator = MetricsAggregator::new().with_reducer("mrr", Reducer::Max);

    aggregator
        .record(&trial, "bm25_eval", &metrics(&[("mrr", 0.4), ("hit@1", 0.2)]))
        .unwrap();
    aggregator
        .record(&trial, "dense_eval", &metrics(&[("mrr", 0.8), ("hit@1", 0.6)]))
        .unwrap();
    let summary = aggregator.finalize(&trial).unwrap();

    assert!(summary.is_sealed());
    assert!((summary.overall()["mrr"] - 0.8).abs() < 1e-12);
    assert!((summary.overall()["hit@1"] - 0.4).abs() < 1e-12);
    assert!(trial.dir().join(SUMMARY_FILE).exists());

    let reloaded = aggregator.summary(&trial).unwrap();
    assert!(reloaded.is_sealed());
    assert_eq!(reloaded.stages().len(), 2);
    assert_eq!(reloaded.trial_id(), trial.id());
}

#[test]
fn test_leaderboard_ranks_trials() {
    let dir = TempDir::new().unwrap();
    let manager = TrialManager::new(dir.path());
    let aggregator = MetricsAggregator::new();

    for value in [0.3, 0.9, 0.6] {
        let trial = manager.start_trial(&config()).unwrap();
        aggregator
            .record(&trial, "evaluation", &metrics(&[("mrr", value)]))
            .unwrap();
        aggregator.finalize(&trial).unwrap();
    }
    // A trial without summary is left out
    manager.start_trial(&config()).unwrap();

    let board = MetricsAggregator::leaderboard(&manager, "mrr").unwrap();
    let order: Vec<&str> = board.iter().map(|r| r.trial_id.as_str()).collect();
    assert_eq!(order, vec!["1", "2", "0"]);
    assert!(MetricsAggregator::leaderboard(&manager, "ndcg").unwrap().is_empty());
}
