//! `split_chunk` chunk module: documents -> chunks via a registered splitter

use crate::component::{
    Capability, ComponentResult, ModuleContract, ParamKind, ParamSpec, Splitter, StageInput,
    StageKind, StageModule, StageOutput,
};
use crate::dataset::{columns, ChunkRow, Dataset, DatasetKind};
use crate::schema::{ColumnSpec, SchemaSpec};
use async_trait::async_trait;
use rayon::prelude::*;

/// Splits each document with the splitter named by the `splitter` parameter.
///
/// Offsets are byte positions of each piece in its document, searched left
/// to right; pieces the splitter rewrote (not found verbatim) get an empty
/// span at the current position.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitChunker;

impl SplitChunker {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::Chunk)
            .requires(SchemaSpec::new(vec![
                ColumnSpec::utf8(columns::DOC_ID),
                ColumnSpec::utf8(columns::CONTENTS),
            ]))
            .produces(DatasetKind::Chunk.required_schema())
            .param(ParamSpec::with_default(
                "splitter",
                ParamKind::Component(Capability::Splitter),
                "period",
            ))
    }
}

/// Chunk one document.
#[must_use]
pub fn chunk_document(splitter: &dyn Splitter, doc_id: &str, text: &str) -> Vec<ChunkRow> {
    // end of the previous located piece, and its start (for overlapping pieces)
    let mut cursor = 0usize;
    let mut previous_start: Option<usize> = None;
    splitter
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let located = find_from(text, cursor, &piece).or_else(|| {
                previous_start
                    .and_then(|p| (p + 1..=text.len()).find(|&b| text.is_char_boundary(b)))
                    .and_then(|from| find_from(text, from, &piece))
            });
            let (start, end) = match located {
                Some(start) => {
                    previous_start = Some(start);
                    cursor = start + piece.len();
                    (start, cursor)
                }
                None => (cursor, cursor),
            };
            ChunkRow {
                doc_id: doc_id.to_string(),
                chunk_id: u32::try_from(i).unwrap_or(u32::MAX),
                contents: piece,
                start_idx: start as u64,
                end_idx: end as u64,
            }
        })
        .collect()
}

fn find_from(text: &str, from: usize, piece: &str) -> Option<usize> {
    text.get(from..)
        .and_then(|rest| rest.find(piece))
        .map(|offset| from + offset)
}

#[async_trait]
impl StageModule for SplitChunker {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let splitter = input.resources.resolve_splitter(input.str_param("splitter")?)?;
        let doc_ids = input.dataset.strings(columns::DOC_ID)?;
        let contents = input.dataset.strings(columns::CONTENTS)?;

        let rows: Vec<ChunkRow> = doc_ids
            .par_iter()
            .zip(contents.par_iter())
            .map(|(doc_id, text)| chunk_document(splitter.as_ref(), doc_id, text))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        tracing::debug!(
            stage = input.stage,
            documents = doc_ids.len(),
            chunks = rows.len(),
            "Documents chunked"
        );
        Ok(StageOutput::new(Dataset::from_chunks(&rows)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::splitters::{FixedSizeSplitter, PeriodSplitter};

    #[test]
    fn test_chunk_offsets_point_into_document() {
        let text = "First point. Second point.";
        let rows = chunk_document(&PeriodSplitter, "doc", text);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(&text[row.start_idx as usize..row.end_idx as usize], row.contents);
        }
        assert_eq!(rows[1].chunk_id, 1);
    }

    #[test]
    fn test_overlapping_windows_located() {
        let splitter = FixedSizeSplitter::new(4, 1).unwrap();
        let rows = chunk_document(&splitter, "doc", "abcdefghij");
        let starts: Vec<u64> = rows.iter().map(|r| r.start_idx).collect();
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(rows[2].end_idx, 10);
    }

    struct Upper;
    impl Splitter for Upper {
        fn split(&self, text: &str) -> Vec<String> {
            vec![text.to_uppercase()]
        }
    }

    #[test]
    fn test_rewritten_piece_gets_empty_span() {
        let rows = chunk_document(&Upper, "doc", "abc");
        assert_eq!((rows[0].start_idx, rows[0].end_idx), (0, 0));
        assert_eq!(rows[0].contents, "ABC");
    }
}
