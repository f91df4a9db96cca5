//! `llm_generator` module: prompts -> generated answers

use crate::component::{
    with_timeout, Capability, ComponentResult, ModuleContract, ParamKind,
    ParamSpec, Params, StageInput, StageKind, StageModule, StageOutput,
};
use crate::dataset::{columns, utf8_array};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;

const SAMPLING_PARAMS: [&str; 2] = ["max_tokens", "temperature"];

/// Calls the generator named by `llm` for every prompt, `concurrency` at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmAnswerGenerator;

impl LlmAnswerGenerator {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::Generation)
            .requires(SchemaSpec::new(vec![ColumnSpec::utf8(columns::PROMPTS)]))
            .produces(SchemaSpec::new(vec![ColumnSpec::utf8(columns::GENERATED_TEXTS)]))
            .preserve_input()
            .param(ParamSpec::required(
                "llm",
                ParamKind::Component(Capability::Generator),
            ))
            .param(ParamSpec::with_default("concurrency", ParamKind::PositiveInteger, 4))
            .param(ParamSpec::with_default("timeout_secs", ParamKind::PositiveInteger, 120))
            .param(ParamSpec::optional("max_tokens", ParamKind::PositiveInteger))
            .param(ParamSpec::optional("temperature", ParamKind::Float))
    }
}

#[async_trait]
impl StageModule for LlmAnswerGenerator {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let llm = input.resources.resolve_generator(input.str_param("llm")?)?;
        let concurrency = input.usize_param("concurrency")?;
        let timeout = Duration::from_secs(input.usize_param("timeout_secs")? as u64);
        let sampling: Arc<Params> = Arc::new(
            input
                .params
                .iter()
                .filter(|(key, _)| SAMPLING_PARAMS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );

        let prompts = input.dataset.strings(columns::PROMPTS)?;
        let answers: Vec<String> = stream::iter(prompts)
            .map(|prompt| {
                let llm = Arc::clone(&llm);
                let sampling = Arc::clone(&sampling);
                async move { with_timeout(timeout, llm.generate(&prompt, &sampling)).await }
            })
            .buffered(concurrency)
            .try_collect::<Vec<String>>()
            .await?;

        let dataset = input.dataset.with_columns(vec![(
            ColumnSpec::utf8(columns::GENERATED_TEXTS),
            utf8_array(&answers),
        )])?;
        Ok(StageOutput::new(dataset))
    }
}
