//! # Trueno-Eval: Trial-Based RAG Pipeline Evaluation
//!
//! **Version**: 0.1.0
//!
//! Trueno-Eval runs configurable retrieval-augmented-generation pipelines
//! (parse, chunk, QA generation, retrieval, prompt making, generation,
//! evaluation) as isolated, reproducible trials. Every stage output is a
//! Parquet artifact, every trial a directory holding its frozen configuration
//! and a metrics summary.
//!
//! ## Architecture
//!
//! ```text
//! config.yaml ──> ConfigCompiler ──> StagePlan ──> PipelineExecutor ──> Trial dir
//!                      │                                │                 ├─ config.yaml
//!                 ModuleRegistry <── resolve (lazy) ────┘                 ├─ trial.json
//!                 (contracts, factories)                                  ├─ 00-<stage>.parquet
//!                                                 MetricsAggregator ────> └─ summary.json
//! ```
//!
//! ## Design Principles
//!
//! - **Fail before work**: configurations are compiled against the input
//!   schemas and every module contract before a trial directory exists
//! - **Durable handoff**: stage N+1 reads stage N's persisted artifact
//! - **Lazy components**: models are constructed once, on first use
//! - **Isolation**: concurrent trials never share a directory
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trueno_eval::evaluator::Evaluator;
//! use trueno_eval::registry::ModuleRegistry;
//!
//! # async fn run() -> trueno_eval::Result<()> {
//! let registry = Arc::new(ModuleRegistry::with_builtins());
//! let evaluator = Evaluator::new("data/qa.parquet", "data/corpus.parquet", "project", registry)?;
//! let summary = evaluator.start_trial("config/bm25.yaml").await?;
//! println!("trial {} mrr={:?}", summary.trial_id(), summary.overall().get("mrr"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod component;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod modules;
pub mod registry;
pub mod schema;
pub mod storage;
pub mod trial;

pub use error::{Error, Result};
