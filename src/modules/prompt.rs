//! `fstring` prompt maker: fills `{query}` and `{retrieved_contents}`

use crate::component::{
    ComponentResult, ModuleContract, ParamKind, ParamSpec, StageInput, StageKind, StageModule,
    StageOutput,
};
use crate::dataset::{columns, utf8_array};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;

/// Renders the `prompt` template once per row.
///
/// Retrieved passages are joined with a blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct FStringPromptMaker;

impl FStringPromptMaker {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::PromptMaker)
            .requires(SchemaSpec::new(vec![
                ColumnSpec::utf8(columns::QUERY),
                ColumnSpec::string_list(columns::RETRIEVED_CONTENTS),
            ]))
            .produces(SchemaSpec::new(vec![ColumnSpec::utf8(columns::PROMPTS)]))
            .preserve_input()
            .param(ParamSpec::required("prompt", ParamKind::String))
    }
}

/// Fill one template.
#[must_use]
pub fn render_prompt(template: &str, query: &str, contents: &[String]) -> String {
    template
        .replace("{query}", query)
        .replace("{retrieved_contents}", &contents.join("\n\n"))
}

#[async_trait]
impl StageModule for FStringPromptMaker {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let template = input.str_param("prompt")?;
        let queries = input.dataset.strings(columns::QUERY)?;
        let contents = input.dataset.string_lists(columns::RETRIEVED_CONTENTS)?;
        let prompts: Vec<String> = queries
            .iter()
            .zip(&contents)
            .map(|(query, passages)| render_prompt(template, query, passages))
            .collect();
        let dataset = input
            .dataset
            .with_columns(vec![(ColumnSpec::utf8(columns::PROMPTS), utf8_array(&prompts))])?;
        Ok(StageOutput::new(dataset))
    }
}
