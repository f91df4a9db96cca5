//! Built-in components
//!
//! | Capability | Name              | Type                    |
//! |------------|-------------------|-------------------------|
//! | splitter   | `period`          | [`PeriodSplitter`]      |
//! | splitter   | `fixed_size`      | [`FixedSizeSplitter`]   |
//! | module     | `plain_text`      | [`PlainTextParser`]     |
//! | module     | `split_chunk`     | [`SplitChunker`]        |
//! | module     | `llm_qa`          | [`LlmQaGenerator`]      |
//! | module     | `bm25`            | [`Bm25Retriever`]       |
//! | module     | `vectordb`        | [`VectorDbRetriever`]   |
//! | module     | `fstring`         | [`FStringPromptMaker`]  |
//! | module     | `llm_generator`   | [`LlmAnswerGenerator`]  |
//! | module     | `retrieval_eval`  | [`RetrievalEvaluator`]  |
//! | module     | `generation_eval` | [`GenerationEvaluator`] |
//!
//! Embedding models and generators wrap external services and are registered
//! by the caller.

mod chunk;
mod evaluation;
mod generation;
mod parse;
mod prompt;
mod qa;
mod retrieval;
pub mod splitters;

pub use chunk::{chunk_document, SplitChunker};
pub use evaluation::{
    exact_match, score_retrieval, token_f1, GenerationEvaluator, RetrievalEvaluator,
    RetrievalScores,
};
pub use generation::LlmAnswerGenerator;
pub use parse::{unique_doc_ids, PlainTextParser};
pub use prompt::{render_prompt, FStringPromptMaker};
pub use qa::{parse_qa_response, LlmQaGenerator};
pub use retrieval::{cosine_similarity, tokenize, Bm25Index, Bm25Retriever, VectorDbRetriever};
pub use splitters::{FixedSizeSplitter, PeriodSplitter};

use crate::registry::{LazyInit, ModuleRegistry};

/// Register every built-in splitter and stage module.
pub fn register_builtins(registry: &ModuleRegistry) {
    registry.register("period", LazyInit::splitter(|_| Ok(PeriodSplitter)));
    registry.register("fixed_size", LazyInit::splitter(FixedSizeSplitter::from_params));

    registry.register(
        "plain_text",
        LazyInit::module(PlainTextParser::contract(), |_| Ok(PlainTextParser)),
    );
    registry.register(
        "split_chunk",
        LazyInit::module(SplitChunker::contract(), |_| Ok(SplitChunker)),
    );
    registry.register(
        "llm_qa",
        LazyInit::module(LlmQaGenerator::contract(), |_| Ok(LlmQaGenerator)),
    );
    registry.register(
        "bm25",
        LazyInit::module(Bm25Retriever::contract(), |_| Ok(Bm25Retriever)),
    );
    registry.register(
        "vectordb",
        LazyInit::module(VectorDbRetriever::contract(), |_| Ok(VectorDbRetriever)),
    );
    registry.register(
        "fstring",
        LazyInit::module(FStringPromptMaker::contract(), |_| Ok(FStringPromptMaker)),
    );
    registry.register(
        "llm_generator",
        LazyInit::module(LlmAnswerGenerator::contract(), |_| Ok(LlmAnswerGenerator)),
    );
    registry.register(
        "retrieval_eval",
        LazyInit::module(RetrievalEvaluator::contract(), |_| Ok(RetrievalEvaluator)),
    );
    registry.register(
        "generation_eval",
        LazyInit::module(GenerationEvaluator::contract(), |_| Ok(GenerationEvaluator)),
    );
    tracing::debug!("Registered built-in components");
}
