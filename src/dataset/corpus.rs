//! Corpus construction helpers (text lines, chunk datasets, file listings)

use super::{columns, utf8_array, Dataset};
use crate::schema::ColumnSpec;
use crate::{Error, Result};
use arrow::array::{ArrayRef, UInt64Array};
use std::sync::Arc;

/// Corpus id of a chunk when chunks are used as a retrieval corpus.
#[must_use]
pub fn chunk_corpus_id(doc_id: &str, chunk_id: u32) -> String {
    format!("{doc_id}-{chunk_id}")
}

/// One document per non-empty line: `doc_id = line_{n}`, `contents`, `line_number`.
///
/// Line numbers count every line of `text`, including skipped blank ones.
///
/// # Errors
///
/// Returns an error if the batch cannot be assembled.
pub fn corpus_from_text_lines(text: &str) -> Result<Dataset> {
    let mut doc_ids = Vec::new();
    let mut contents = Vec::new();
    let mut line_numbers = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        doc_ids.push(format!("line_{number}"));
        contents.push(trimmed.to_string());
        line_numbers.push(number as u64);
    }
    let line_array: ArrayRef = Arc::new(UInt64Array::from(line_numbers));
    Dataset::from_columns(vec![
        (ColumnSpec::utf8(columns::DOC_ID), utf8_array(&doc_ids)),
        (ColumnSpec::utf8(columns::CONTENTS), utf8_array(&contents)),
        (ColumnSpec::uint64(columns::LINE_NUMBER), line_array),
    ])
}

/// Retrieval corpus from a chunk dataset (`doc_id = "{doc_id}-{chunk_id}"`).
///
/// # Errors
///
/// Returns an error if the chunk columns are missing or mistyped.
pub fn chunks_as_corpus(chunks: &Dataset) -> Result<Dataset> {
    let doc_ids = chunks.strings(columns::DOC_ID)?;
    let chunk_ids = chunks.u32s(columns::CHUNK_ID)?;
    let contents = chunks.strings(columns::CONTENTS)?;
    let ids: Vec<String> = doc_ids
        .iter()
        .zip(&chunk_ids)
        .map(|(doc, chunk)| chunk_corpus_id(doc, *chunk))
        .collect();
    Dataset::from_columns(vec![
        (ColumnSpec::utf8(columns::DOC_ID), utf8_array(&ids)),
        (ColumnSpec::utf8(columns::CONTENTS), utf8_array(&contents)),
    ])
}

/// File listing dataset (`path`) for a parse stage, sorted for determinism.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a matched path is unreadable.
pub fn file_listing(pattern: &str) -> Result<Dataset> {
    let entries = glob::glob(pattern)
        .map_err(|e| Error::Storage(format!("invalid glob pattern '{pattern}': {e}")))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::Storage(format!("cannot read glob match: {e}")))?;
        if path.is_file() {
            paths.push(path.to_string_lossy().into_owned());
        }
    }
    paths.sort();
    Dataset::from_columns(vec![(ColumnSpec::utf8(columns::PATH), utf8_array(&paths))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ChunkRow, DatasetKind};

    #[test]
    fn test_corpus_from_text_lines_skips_blank_lines() {
        let ds = corpus_from_text_lines("first line\n\n  second line  \n").unwrap();
        assert_eq!(ds.strings(columns::DOC_ID).unwrap(), vec!["line_0", "line_2"]);
        assert_eq!(ds.strings(columns::CONTENTS).unwrap(), vec!["first line", "second line"]);
        assert_eq!(ds.u64s(columns::LINE_NUMBER).unwrap(), vec![0, 2]);
        ds.validate_kind(DatasetKind::Corpus).unwrap();
    }

    #[test]
    fn test_chunks_as_corpus_ids() {
        let chunks = Dataset::from_chunks(&[ChunkRow {
            doc_id: "guide".into(),
            chunk_id: 3,
            contents: "text".into(),
            start_idx: 0,
            end_idx: 4,
        }])
        .unwrap();
        let corpus = chunks_as_corpus(&chunks).unwrap();
        assert_eq!(corpus.strings(columns::DOC_ID).unwrap(), vec!["guide-3"]);
    }

    #[test]
    fn test_file_listing_matches_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let pattern = format!("{}/*", dir.path().display());
        let ds = file_listing(&pattern).unwrap();
        let paths = ds.strings(columns::PATH).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.txt"));
    }
}
