//! `llm_qa` module: chunks -> question/answer pairs through a generator

use crate::component::{
    with_timeout, Capability, ComponentResult, ModuleContract, ParamKind, ParamSpec, Params,
    StageInput, StageKind, StageModule, StageOutput,
};
use crate::dataset::{chunk_corpus_id, columns, Dataset, DatasetKind, QuestionRow};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;

const QA_PROMPT: &str = "Write one question that the passage below answers, then its answer.\n\
Reply exactly in the form:\nQuestion: <question>\nAnswer: <answer>\n\nPassage:\n";

/// Generates one question per chunk; the chunk is the retrieval ground truth.
///
/// Responses without a `Question:` line are skipped with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmQaGenerator;

impl LlmQaGenerator {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        let mut produces = DatasetKind::Question.required_schema().columns().to_vec();
        produces.push(ColumnSpec::string_list(columns::RETRIEVAL_GT));
        produces.push(ColumnSpec::string_list(columns::GENERATION_GT));
        ModuleContract::new(StageKind::QaGeneration)
            .requires(SchemaSpec::new(vec![
                ColumnSpec::utf8(columns::DOC_ID),
                ColumnSpec::uint32(columns::CHUNK_ID),
                ColumnSpec::utf8(columns::CONTENTS),
            ]))
            .produces(SchemaSpec::new(produces))
            .param(ParamSpec::required(
                "llm",
                ParamKind::Component(Capability::Generator),
            ))
            .param(ParamSpec::with_default("concurrency", ParamKind::PositiveInteger, 4))
            .param(ParamSpec::with_default("timeout_secs", ParamKind::PositiveInteger, 120))
            .param(ParamSpec::optional("max_chunks", ParamKind::PositiveInteger))
    }
}

/// Parse a `Question: ... Answer: ...` response.
#[must_use]
pub fn parse_qa_response(response: &str) -> Option<(String, String)> {
    let mut question = None;
    let mut answer = String::new();
    for line in response.lines() {
        let line = line.trim();
        if let Some(q) = line.strip_prefix("Question:") {
            question = Some(q.trim().to_string());
        } else if let Some(a) = line.strip_prefix("Answer:") {
            answer = a.trim().to_string();
        }
    }
    question.filter(|q| !q.is_empty()).map(|q| (q, answer))
}

#[async_trait]
impl StageModule for LlmQaGenerator {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let llm = input.resources.resolve_generator(input.str_param("llm")?)?;
        let concurrency = input.usize_param("concurrency")?;
        let timeout = Duration::from_secs(input.usize_param("timeout_secs")? as u64);
        let limit = input
            .params
            .get("max_chunks")
            .and_then(serde_json::Value::as_u64)
            .map_or(usize::MAX, |v| usize::try_from(v).unwrap_or(usize::MAX));

        let doc_ids = input.dataset.strings(columns::DOC_ID)?;
        let chunk_ids = input.dataset.u32s(columns::CHUNK_ID)?;
        let contents = input.dataset.strings(columns::CONTENTS)?;
        let sampling = Arc::new(Params::new());

        let jobs: Vec<(String, String)> = doc_ids
            .iter()
            .zip(&chunk_ids)
            .zip(&contents)
            .take(limit)
            .map(|((doc, chunk), text)| (chunk_corpus_id(doc, *chunk), format!("{QA_PROMPT}{text}")))
            .collect();

        let responses: Vec<(String, String)> = stream::iter(jobs)
            .map(|(corpus_id, prompt)| {
                let llm = Arc::clone(&llm);
                let sampling = Arc::clone(&sampling);
                async move {
                    let response = with_timeout(timeout, llm.generate(&prompt, &sampling)).await?;
                    Ok::<_, crate::component::ComponentError>((corpus_id, response))
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let mut rows = Vec::with_capacity(responses.len());
        for (corpus_id, response) in responses {
            match parse_qa_response(&response) {
                Some((query, answer)) => rows.push(QuestionRow {
                    qid: format!("q-{corpus_id}"),
                    query,
                    retrieval_gt: vec![corpus_id],
                    generation_gt: if answer.is_empty() { vec![] } else { vec![answer] },
                }),
                None => tracing::warn!(
                    stage = input.stage,
                    chunk = %corpus_id,
                    "Generator response has no question, chunk skipped"
                ),
            }
        }
        Ok(StageOutput::new(Dataset::from_questions(&rows)?))
    }
}
