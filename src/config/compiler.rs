//! Configuration compiler: `PipelineConfig` -> validated `StagePlan`
//!
//! Compilation only inspects declarations registered in the
//! [`ModuleRegistry`]; it never constructs a component or touches the
//! filesystem, so it doubles as a dry validation of a configuration.
//!
//! Checks, per stage in order:
//! 1. the stage kind exists (`UnknownStage`) and the stage name is unique
//! 2. the module is registered (`UnknownComponent`) for that kind
//!    (`ComponentKindMismatch`)
//! 3. parameters match the module's declared contract (`InvalidParameter`),
//!    component references name registered resources (`UnknownComponent`)
//! 4. the module's required input is a subset of the previous stage's output
//!    (`SchemaMismatch`), likewise for the corpus side input

use super::{PipelineConfig, RetryConfig, StageConfig};
use crate::component::{Capability, ModuleContract, ParamKind, Params, StageKind};
use crate::dataset::Dataset;
use crate::registry::ModuleRegistry;
use crate::schema::SchemaSpec;
use crate::{Error, Result};
use std::collections::HashSet;

/// Schemas available to the first stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanInputs {
    dataset: SchemaSpec,
    corpus: Option<SchemaSpec>,
}

impl PlanInputs {
    /// Initial dataset schema, no corpus.
    #[must_use]
    pub const fn new(dataset: SchemaSpec) -> Self {
        Self {
            dataset,
            corpus: None,
        }
    }

    /// Add a corpus side input.
    #[must_use]
    pub fn with_corpus(mut self, corpus: SchemaSpec) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Schemas of concrete datasets.
    #[must_use]
    pub fn from_datasets(initial: &Dataset, corpus: Option<&Dataset>) -> Self {
        Self {
            dataset: initial.schema_spec(),
            corpus: corpus.map(Dataset::schema_spec),
        }
    }

    /// Initial dataset schema.
    #[must_use]
    pub const fn dataset(&self) -> &SchemaSpec {
        &self.dataset
    }

    /// Corpus schema, if any.
    #[must_use]
    pub const fn corpus(&self) -> Option<&SchemaSpec> {
        self.corpus.as_ref()
    }
}

/// One compiled stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    index: usize,
    name: String,
    kind: StageKind,
    module: String,
    params: Params,
    input: SchemaSpec,
    output: SchemaSpec,
    resources: Vec<(Capability, String)>,
}

impl StageSpec {
    /// Position in the plan.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Unique stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage kind.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.kind
    }

    /// Module name.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Resolved parameters (defaults filled in).
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Required input columns.
    #[must_use]
    pub const fn input_schema(&self) -> &SchemaSpec {
        &self.input
    }

    /// Declared output columns.
    #[must_use]
    pub const fn output_schema(&self) -> &SchemaSpec {
        &self.output
    }

    /// Resources referenced through parameters.
    #[must_use]
    pub fn resources(&self) -> &[(Capability, String)] {
        &self.resources
    }

    /// Artifact file name inside the trial directory.
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        format!("{:02}-{}.parquet", self.index, self.name)
    }
}

/// Immutable, validated sequence of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    stages: Vec<StageSpec>,
    inputs: PlanInputs,
    retry: RetryConfig,
    config: PipelineConfig,
}

impl StagePlan {
    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the plan has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Schemas the plan was compiled against.
    #[must_use]
    pub const fn inputs(&self) -> &PlanInputs {
        &self.inputs
    }

    /// Retry settings.
    #[must_use]
    pub const fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Resolved configuration (stage names and default parameters filled in).
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Declared output schema of the last stage.
    #[must_use]
    pub fn output_schema(&self) -> Option<&SchemaSpec> {
        self.stages.last().map(StageSpec::output_schema)
    }
}

/// Compiles configurations against a registry's declarations.
#[derive(Debug, Clone, Copy)]
pub struct ConfigCompiler<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> ConfigCompiler<'a> {
    /// Compiler bound to `registry`.
    #[must_use]
    pub const fn new(registry: &'a ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Compile `config` for a run whose inputs have the given schemas.
    ///
    /// # Errors
    ///
    /// Returns the first compile-time error found (see module docs).
    pub fn compile(&self, config: &PipelineConfig, inputs: &PlanInputs) -> Result<StagePlan> {
        validate_retry(&config.retry)?;
        if config.stages.is_empty() {
            return Err(Error::Config("pipeline must define at least one stage".to_string()));
        }

        let mut seen = HashSet::new();
        let mut stages = Vec::with_capacity(config.stages.len());
        let mut resolved_stages = Vec::with_capacity(config.stages.len());
        let mut current = inputs.dataset.clone();
        let mut upstream = "input".to_string();

        for (index, stage_config) in config.stages.iter().enumerate() {
            let kind = StageKind::from_name(&stage_config.stage).ok_or_else(|| Error::UnknownStage {
                stage: stage_config.stage.clone(),
                known: StageKind::names(),
            })?;
            let name = stage_config.effective_name().to_string();
            validate_stage_name(&name)?;
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateStage(name));
            }

            let contract = self.registry.contract(&stage_config.module).ok_or_else(|| {
                Error::UnknownComponent {
                    stage: name.clone(),
                    capability: Capability::Module,
                    name: stage_config.module.clone(),
                }
            })?;
            if contract.kind() != kind {
                return Err(Error::ComponentKindMismatch {
                    stage: name,
                    module: stage_config.module.clone(),
                    actual: contract.kind().to_string(),
                });
            }

            let (params, resources) =
                self.resolve_params(&name, &stage_config.module, &contract, &stage_config.params)?;

            let missing = contract.required_input().missing_from(&current);
            if !missing.is_empty() {
                return Err(Error::SchemaMismatch {
                    upstream,
                    downstream: name,
                    missing,
                });
            }
            if let Some(corpus_requirement) = contract.corpus_requirement() {
                let missing = match inputs.corpus() {
                    Some(corpus) => corpus_requirement.missing_from(corpus),
                    None => corpus_requirement.columns().iter().map(ToString::to_string).collect(),
                };
                if !missing.is_empty() {
                    return Err(Error::SchemaMismatch {
                        upstream: "corpus".to_string(),
                        downstream: name,
                        missing,
                    });
                }
            }

            let output = contract.output_for(&current);
            resolved_stages.push(StageConfig {
                stage: stage_config.stage.clone(),
                name: Some(name.clone()),
                module: stage_config.module.clone(),
                params: params.clone(),
            });
            stages.push(StageSpec {
                index,
                name: name.clone(),
                kind,
                module: stage_config.module.clone(),
                params,
                input: contract.required_input().clone(),
                output: output.clone(),
                resources,
            });
            current = output;
            upstream = name;
        }

        tracing::debug!(stages = stages.len(), "Compiled stage plan");
        Ok(StagePlan {
            stages,
            inputs: inputs.clone(),
            retry: config.retry,
            config: PipelineConfig {
                name: config.name.clone(),
                retry: config.retry,
                stages: resolved_stages,
            },
        })
    }

    fn resolve_params(
        &self,
        stage: &str,
        module: &str,
        contract: &ModuleContract,
        given: &Params,
    ) -> Result<(Params, Vec<(Capability, String)>)> {
        let invalid = |reason: String| Error::InvalidParameter {
            stage: stage.to_string(),
            module: module.to_string(),
            reason,
        };

        if let Some(unknown) = given.keys().find(|key| contract.param_spec(key).is_none()) {
            let known: Vec<&str> = contract.params().iter().map(|p| p.name()).collect();
            return Err(invalid(format!(
                "unknown parameter '{unknown}' (accepted: [{}])",
                known.join(", ")
            )));
        }

        let mut resolved = Params::new();
        let mut resources = Vec::new();
        for spec in contract.params() {
            let value = match given.get(spec.name()) {
                Some(value) => value.clone(),
                None if spec.is_required() => {
                    return Err(invalid(format!("missing required parameter '{}'", spec.name())));
                }
                None => match spec.default_value() {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            if !spec.kind().accepts(&value) {
                return Err(invalid(format!(
                    "parameter '{}' expects {}, got {value}",
                    spec.name(),
                    spec.kind()
                )));
            }
            if let (ParamKind::Component(capability), Some(name)) = (spec.kind(), value.as_str()) {
                if !self.registry.contains(*capability, name) {
                    return Err(Error::UnknownComponent {
                        stage: stage.to_string(),
                        capability: *capability,
                        name: name.to_string(),
                    });
                }
                resources.push((*capability, name.to_string()));
            }
            resolved.insert(spec.name().to_string(), value);
        }
        Ok((resolved, resources))
    }
}

fn validate_retry(retry: &RetryConfig) -> Result<()> {
    if retry.base_backoff_ms > retry.max_backoff_ms {
        return Err(Error::Config(format!(
            "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
            retry.base_backoff_ms, retry.max_backoff_ms
        )));
    }
    Ok(())
}

fn validate_stage_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "stage name '{name}' must be non-empty ASCII letters, digits, '_' or '-'"
        )))
    }
}
