//! Declared module contracts (stage kind, schemas, parameters)
//!
//! A contract is registered next to a module's factory so that the compiler
//! can validate a configuration without constructing anything.

use super::Capability;
use crate::schema::SchemaSpec;
use serde_json::Value;
use std::fmt;

/// Stage parameters (free-form JSON object validated against `ParamSpec`s)
pub type Params = serde_json::Map<String, Value>;

/// Pipeline stage kinds accepted in a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Raw documents to text
    Parse,
    /// Text to chunks
    Chunk,
    /// Chunks to question/answer pairs
    QaGeneration,
    /// Questions to ranked corpus ids
    Retrieval,
    /// Retrieved passages to prompts
    PromptMaker,
    /// Prompts to generated answers
    Generation,
    /// Scoring of upstream outputs
    Evaluation,
}

impl StageKind {
    /// All stage kinds in canonical pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Parse,
        Self::Chunk,
        Self::QaGeneration,
        Self::Retrieval,
        Self::PromptMaker,
        Self::Generation,
        Self::Evaluation,
    ];

    /// Configuration name of the stage kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Chunk => "chunk",
            Self::QaGeneration => "qa_generation",
            Self::Retrieval => "retrieval",
            Self::PromptMaker => "prompt_maker",
            Self::Generation => "generation",
            Self::Evaluation => "evaluation",
        }
    }

    /// Look up a stage kind by configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Names of all stage kinds.
    #[must_use]
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted value shape for a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Any JSON integer
    Integer,
    /// Integer >= 1
    PositiveInteger,
    /// Any JSON number
    Float,
    /// JSON boolean
    Bool,
    /// JSON string
    String,
    /// List of strings drawn from a fixed vocabulary
    Subset(&'static [&'static str]),
    /// Name of a registered component of the given capability
    Component(Capability),
    /// Any value
    Any,
}

impl ParamKind {
    /// Check that `value` has this shape.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::PositiveInteger => value.as_u64().is_some_and(|v| v >= 1),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::String | Self::Component(_) => value.is_string(),
            Self::Subset(allowed) => value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|s| allowed.contains(&s)))
            }),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::PositiveInteger => f.write_str("positive integer"),
            Self::Float => f.write_str("number"),
            Self::Bool => f.write_str("boolean"),
            Self::String => f.write_str("string"),
            Self::Subset(allowed) => write!(f, "list drawn from [{}]", allowed.join(", ")),
            Self::Component(capability) => write!(f, "{capability} name"),
            Self::Any => f.write_str("any value"),
        }
    }
}

/// Declared parameter of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    required: bool,
    default: Option<Value>,
}

impl ParamSpec {
    /// A parameter that must be present in the configuration.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    /// An optional parameter without a default.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    /// An optional parameter filled with `default` when absent.
    #[must_use]
    pub fn with_default(name: impl Into<String>, kind: ParamKind, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default.into()),
        }
    }

    /// Get the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the accepted value shape.
    #[must_use]
    pub const fn kind(&self) -> &ParamKind {
        &self.kind
    }

    /// Whether the parameter must be supplied.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Get the default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// What a module consumes, produces and accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleContract {
    kind: StageKind,
    requires: SchemaSpec,
    produces: SchemaSpec,
    preserves_input: bool,
    corpus: Option<SchemaSpec>,
    params: Vec<ParamSpec>,
}

impl ModuleContract {
    /// Start a contract for a module serving `kind` stages.
    #[must_use]
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            requires: SchemaSpec::default(),
            produces: SchemaSpec::default(),
            preserves_input: false,
            corpus: None,
            params: Vec::new(),
        }
    }

    /// Columns the stage input must provide.
    #[must_use]
    pub fn requires(mut self, schema: SchemaSpec) -> Self {
        self.requires = schema;
        self
    }

    /// Columns the module adds (or emits, when input is not preserved).
    #[must_use]
    pub fn produces(mut self, schema: SchemaSpec) -> Self {
        self.produces = schema;
        self
    }

    /// Output keeps every input column and appends `produces`.
    #[must_use]
    pub const fn preserve_input(mut self) -> Self {
        self.preserves_input = true;
        self
    }

    /// Module reads the corpus side input, which must provide `schema`.
    #[must_use]
    pub fn needs_corpus(mut self, schema: SchemaSpec) -> Self {
        self.corpus = Some(schema);
        self
    }

    /// Declare a parameter.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Stage kind served by the module.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.kind
    }

    /// Required input columns.
    #[must_use]
    pub const fn required_input(&self) -> &SchemaSpec {
        &self.requires
    }

    /// Produced columns.
    #[must_use]
    pub const fn produced(&self) -> &SchemaSpec {
        &self.produces
    }

    /// Corpus requirement, if the module reads the corpus.
    #[must_use]
    pub const fn corpus_requirement(&self) -> Option<&SchemaSpec> {
        self.corpus.as_ref()
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a declared parameter.
    #[must_use]
    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Output schema of the module given its input schema.
    #[must_use]
    pub fn output_for(&self, input: &SchemaSpec) -> SchemaSpec {
        if self.preserves_input {
            input.merge(&self.produces)
        } else {
            self.produces.clone()
        }
    }
}
