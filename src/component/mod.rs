//! Pluggable component capabilities
//!
//! Every registered component belongs to exactly one capability with a fixed
//! contract:
//!
//! ```text
//! Splitter   : &str                 -> Vec<String>
//! Embedding  : &str                 -> Vec<f32>        (async, external)
//! Generator  : &str + Params        -> String          (async, external)
//! Module     : StageInput           -> StageOutput     (async, one pipeline stage)
//! ```
//!
//! Modules are what a configuration names per stage; splitters, embedding
//! models and generators are resources that modules look up by name through
//! the registry passed in [`StageInput`].

mod contract;
mod error;

pub use contract::{ModuleContract, ParamKind, ParamSpec, Params, StageKind};
pub use error::{with_timeout, ComponentError, ComponentErrorKind, ComponentResult};

use crate::dataset::Dataset;
use crate::registry::ModuleRegistry;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Capability kind of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Text splitter used by chunking modules
    Splitter,
    /// Embedding model used by dense retrieval
    Embedding,
    /// Language model used by QA generation and answer generation
    Generator,
    /// Pipeline stage module
    Module,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Splitter => f.write_str("splitter"),
            Self::Embedding => f.write_str("embedding"),
            Self::Generator => f.write_str("generator"),
            Self::Module => f.write_str("module"),
        }
    }
}

/// Splits a text into sentence-like pieces.
pub trait Splitter: Send + Sync {
    /// Split `text`; empty pieces are not returned.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Maps text to a dense vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> ComponentResult<Vec<f32>>;

    /// Embed several texts, in order.
    async fn embed_batch(&self, texts: &[String]) -> ComponentResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Produces text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`; `params` carries sampling knobs.
    async fn generate(&self, prompt: &str, params: &Params) -> ComponentResult<String>;
}

/// Everything a module sees when its stage runs.
pub struct StageInput<'a> {
    /// Stage name from the plan
    pub stage: &'a str,
    /// Output of the previous stage (or the initial dataset)
    pub dataset: &'a Dataset,
    /// Resolved stage parameters (defaults filled in)
    pub params: &'a Params,
    /// Corpus side input, when the run has one
    pub corpus: Option<&'a Dataset>,
    /// Registry for resolving splitters, embedding models and generators
    pub resources: &'a ModuleRegistry,
}

impl StageInput<'_> {
    /// Corpus side input, or a fatal error naming the stage.
    ///
    /// # Errors
    ///
    /// Returns a fatal `ComponentError` when the run has no corpus.
    pub fn require_corpus(&self) -> ComponentResult<&Dataset> {
        self.corpus.ok_or_else(|| {
            ComponentError::fatal(format!("stage '{}' requires a corpus", self.stage))
        })
    }

    /// String parameter.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the parameter is absent or not a string.
    pub fn str_param(&self, name: &str) -> ComponentResult<&str> {
        self.params
            .get(name)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ComponentError::fatal(format!("parameter '{name}' must be a string")))
    }

    /// Unsigned integer parameter.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the parameter is absent or not an unsigned integer.
    pub fn usize_param(&self, name: &str) -> ComponentResult<usize> {
        self.params
            .get(name)
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                ComponentError::fatal(format!("parameter '{name}' must be an unsigned integer"))
            })
    }

    /// Float parameter.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the parameter is absent or not a number.
    pub fn f64_param(&self, name: &str) -> ComponentResult<f64> {
        self.params
            .get(name)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| ComponentError::fatal(format!("parameter '{name}' must be a number")))
    }

    /// String-list parameter.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the parameter is absent or not a list of strings.
    pub fn str_list_param(&self, name: &str) -> ComponentResult<Vec<String>> {
        self.params
            .get(name)
            .and_then(serde_json::Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                ComponentError::fatal(format!("parameter '{name}' must be a list of strings"))
            })
    }
}

/// What a module hands back to the executor.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// New dataset (the input is never edited in place)
    pub dataset: Dataset,
    /// Stage-level scores to record in the trial summary
    pub metrics: BTreeMap<String, f64>,
}

impl StageOutput {
    /// Output without metrics.
    #[must_use]
    pub const fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            metrics: BTreeMap::new(),
        }
    }

    /// Output with stage metrics.
    #[must_use]
    pub const fn with_metrics(dataset: Dataset, metrics: BTreeMap<String, f64>) -> Self {
        Self { dataset, metrics }
    }
}

/// One pipeline stage implementation.
#[async_trait]
pub trait StageModule: Send + Sync {
    /// Run the stage over `input.dataset`.
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput>;
}

/// A constructed component instance, shared by every trial in the process.
#[derive(Clone)]
pub enum Component {
    /// Splitter instance
    Splitter(Arc<dyn Splitter>),
    /// Embedding model instance
    Embedding(Arc<dyn EmbeddingModel>),
    /// Generator instance
    Generator(Arc<dyn Generator>),
    /// Stage module instance
    Module(Arc<dyn StageModule>),
}

impl Component {
    /// Capability of this instance.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Splitter(_) => Capability::Splitter,
            Self::Embedding(_) => Capability::Embedding,
            Self::Generator(_) => Capability::Generator,
            Self::Module(_) => Capability::Module,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component::{}", self.capability())
    }
}
