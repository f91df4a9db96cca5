//! Integration tests for the lazy component registry
//!
//! The registry is shared by every trial in a process, so single construction
//! must hold under concurrent resolution.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use trueno_eval::component::{
    Capability, ComponentError, ComponentResult, EmbeddingModel, Generator, Params,
};
use trueno_eval::registry::{LazyInit, ModuleRegistry};
use trueno_eval::Error;

/// Embedding model whose construction is slow (model load).
struct SlowModel {
    dimension: usize,
}

#[async_trait]
impl EmbeddingModel for SlowModel {
    async fn embed(&self, text: &str) -> ComponentResult<Vec<f32>> {
        #[allow(clippy::cast_precision_loss)]
        Ok(vec![text.len() as f32; self.dimension])
    }
}

struct Echo;

#[async_trait]
impl Generator for Echo {
    async fn generate(&self, prompt: &str, _params: &Params) -> ComponentResult<String> {
        Ok(prompt.to_uppercase())
    }
}

fn counting_model(counter: &Arc<AtomicUsize>) -> LazyInit {
    let counter = Arc::clone(counter);
    LazyInit::embedding(move |params| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        let dimension = params
            .get("dimension")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ComponentError::fatal("dimension required"))?;
        Ok(SlowModel {
            dimension: usize::try_from(dimension).unwrap_or(0),
        })
    })
    .param("dimension", 4)
}

#[test]
fn test_concurrent_resolution_constructs_once() {
    let registry = Arc::new(ModuleRegistry::new());
    let constructions = Arc::new(AtomicUsize::new(0));
    registry.register("flagembed_large", counting_model(&constructions));

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let instances: Vec<Arc<dyn EmbeddingModel>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    barrier.wait();
                    registry.resolve_embedding("flagembed_large").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(registry.construction_count(), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_from_tasks() {
    let registry = Arc::new(ModuleRegistry::new());
    let constructions = Arc::new(AtomicUsize::new(0));
    registry.register("flagembed_large", counting_model(&constructions));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || {
                registry.resolve_embedding("flagembed_large").map(|_| ())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    let model = registry.resolve_embedding("flagembed_large").unwrap();
    assert_eq!(model.embed("abc").await.unwrap(), vec![3.0; 4]);
}

#[test]
fn test_different_names_construct_independently() {
    let registry = ModuleRegistry::new();
    let constructions = Arc::new(AtomicUsize::new(0));
    registry.register("small", counting_model(&constructions));
    registry.register("large", counting_model(&constructions));

    thread::scope(|scope| {
        scope.spawn(|| registry.resolve_embedding("small").unwrap());
        scope.spawn(|| registry.resolve_embedding("large").unwrap());
    });

    assert_eq!(constructions.load(Ordering::SeqCst), 2);
    assert_eq!(registry.names(Capability::Embedding), vec!["large", "small"]);
}

#[test]
fn test_unused_components_are_never_constructed() {
    let registry = ModuleRegistry::with_builtins();
    let constructions = Arc::new(AtomicUsize::new(0));
    registry.register("flagembed_large", counting_model(&constructions));
    registry.register("echo", LazyInit::generator(|_| Ok(Echo)));

    registry.resolve_generator("echo").unwrap();
    assert_eq!(constructions.load(Ordering::SeqCst), 0);
    assert!(!registry.is_constructed(Capability::Embedding, "flagembed_large"));
    assert!(registry.is_constructed(Capability::Generator, "echo"));
}

#[test]
fn test_failed_construction_is_retried_on_next_resolve() {
    let registry = ModuleRegistry::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    registry.register(
        "warming_up",
        LazyInit::generator(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ComponentError::transient("server starting"))
            } else {
                Ok(Echo)
            }
        }),
    );

    let err = registry
        .resolve_generator("warming_up")
        .err()
        .expect("first construction fails");
    match err {
        Error::ComponentInit { source, .. } => assert!(source.is_transient()),
        other => panic!("expected ComponentInit, got {other}"),
    }
    assert!(registry.resolve_generator("warming_up").is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(registry.construction_count(), 1);
}
