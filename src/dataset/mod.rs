//! Tabular datasets flowing between pipeline stages
//!
//! A `Dataset` wraps a single Arrow `RecordBatch`. Stages never edit their
//! input: every transformation returns a new `Dataset`.
//!
//! ## Dataset kinds
//!
//! ```text
//! Question    : qid, query, [retrieval_gt], [generation_gt]      key = qid
//! Corpus      : doc_id, contents, [metadata]                     key = doc_id
//! Chunk       : doc_id, chunk_id, contents, start_idx, end_idx   key = doc_id + chunk_id
//! Parsed      : doc_id, path, contents                           key = doc_id
//! FileListing : path                                             key = path
//! ```

mod arrays;
mod corpus;

pub use arrays::{
    float64_array, float_list_array, optional_utf8_array, string_list_array, uint32_array,
    uint64_array, utf8_array,
};
pub use corpus::{chunk_corpus_id, chunks_as_corpus, corpus_from_text_lines, file_listing};

use crate::schema::{ColumnSpec, SchemaSpec};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::collections::HashSet;
use std::sync::Arc;

/// Well-known column names.
pub mod columns {
    /// Question id
    pub const QID: &str = "qid";
    /// Question text
    pub const QUERY: &str = "query";
    /// Ground-truth corpus ids
    pub const RETRIEVAL_GT: &str = "retrieval_gt";
    /// Ground-truth answers
    pub const GENERATION_GT: &str = "generation_gt";
    /// Document id
    pub const DOC_ID: &str = "doc_id";
    /// Document or chunk text
    pub const CONTENTS: &str = "contents";
    /// JSON metadata
    pub const METADATA: &str = "metadata";
    /// Source file path
    pub const PATH: &str = "path";
    /// Chunk index within its document
    pub const CHUNK_ID: &str = "chunk_id";
    /// Chunk start byte offset
    pub const START_IDX: &str = "start_idx";
    /// Chunk end byte offset (exclusive)
    pub const END_IDX: &str = "end_idx";
    /// Line number of a line-derived document
    pub const LINE_NUMBER: &str = "line_number";
    /// Ranked corpus ids
    pub const RETRIEVED_IDS: &str = "retrieved_ids";
    /// Contents of ranked corpus ids
    pub const RETRIEVED_CONTENTS: &str = "retrieved_contents";
    /// Scores of ranked corpus ids
    pub const RETRIEVE_SCORES: &str = "retrieve_scores";
    /// Rendered prompts
    pub const PROMPTS: &str = "prompts";
    /// Generated answers
    pub const GENERATED_TEXTS: &str = "generated_texts";
}

/// Dataset kinds with a required schema and a unique row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Evaluation questions
    Question,
    /// Retrieval corpus
    Corpus,
    /// Chunked documents
    Chunk,
    /// Parsed documents
    Parsed,
    /// Files to parse
    FileListing,
}

impl DatasetKind {
    /// Columns every dataset of this kind must carry.
    #[must_use]
    pub fn required_schema(self) -> SchemaSpec {
        use columns::{CHUNK_ID, CONTENTS, DOC_ID, END_IDX, PATH, QID, QUERY, START_IDX};
        SchemaSpec::new(match self {
            Self::Question => vec![ColumnSpec::utf8(QID), ColumnSpec::utf8(QUERY)],
            Self::Corpus => vec![ColumnSpec::utf8(DOC_ID), ColumnSpec::utf8(CONTENTS)],
            Self::Chunk => vec![
                ColumnSpec::utf8(DOC_ID),
                ColumnSpec::uint32(CHUNK_ID),
                ColumnSpec::utf8(CONTENTS),
                ColumnSpec::uint64(START_IDX),
                ColumnSpec::uint64(END_IDX),
            ],
            Self::Parsed => vec![
                ColumnSpec::utf8(DOC_ID),
                ColumnSpec::utf8(PATH),
                ColumnSpec::utf8(CONTENTS),
            ],
            Self::FileListing => vec![ColumnSpec::utf8(PATH)],
        })
    }

    /// Columns forming the unique row key.
    #[must_use]
    pub const fn key(self) -> &'static [&'static str] {
        match self {
            Self::Question => &[columns::QID],
            Self::Corpus | Self::Parsed => &[columns::DOC_ID],
            Self::Chunk => &[columns::DOC_ID, columns::CHUNK_ID],
            Self::FileListing => &[columns::PATH],
        }
    }
}

/// One evaluation question.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuestionRow {
    /// Unique question id
    pub qid: String,
    /// Question text
    pub query: String,
    /// Relevant corpus ids
    pub retrieval_gt: Vec<String>,
    /// Reference answers
    pub generation_gt: Vec<String>,
}

/// One corpus document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorpusRow {
    /// Unique document id
    pub doc_id: String,
    /// Document text
    pub contents: String,
    /// Optional JSON metadata
    pub metadata: Option<String>,
}

/// One chunk of a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkRow {
    /// Parent document id
    pub doc_id: String,
    /// Chunk index within the document
    pub chunk_id: u32,
    /// Chunk text
    pub contents: String,
    /// Start byte offset in the document
    pub start_idx: u64,
    /// End byte offset in the document (exclusive)
    pub end_idx: u64,
}

/// Immutable tabular dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    /// Wrap a record batch.
    #[must_use]
    pub const fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Zero-row dataset with the declared schema.
    #[must_use]
    pub fn empty(schema: &SchemaSpec) -> Self {
        Self {
            batch: RecordBatch::new_empty(schema.to_arrow()),
        }
    }

    /// Build from declared columns and their arrays.
    ///
    /// # Errors
    ///
    /// Returns an error if array lengths differ or types do not match the declarations.
    pub fn from_columns(columns: Vec<(ColumnSpec, ArrayRef)>) -> Result<Self> {
        let (specs, arrays): (Vec<ColumnSpec>, Vec<ArrayRef>) = columns.into_iter().unzip();
        let schema = SchemaSpec::new(specs).to_arrow();
        let row_count = arrays.first().map_or(0, |a| a.len());
        let options = RecordBatchOptions::new().with_row_count(Some(row_count));
        let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;
        Ok(Self { batch })
    }

    /// Question dataset from rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be assembled.
    pub fn from_questions(rows: &[QuestionRow]) -> Result<Self> {
        use columns::{GENERATION_GT, QID, QUERY, RETRIEVAL_GT};
        Self::from_columns(vec![
            (ColumnSpec::utf8(QID), utf8_array(rows.iter().map(|r| &r.qid))),
            (ColumnSpec::utf8(QUERY), utf8_array(rows.iter().map(|r| &r.query))),
            (
                ColumnSpec::string_list(RETRIEVAL_GT),
                string_list_array(&rows.iter().map(|r| r.retrieval_gt.clone()).collect::<Vec<_>>()),
            ),
            (
                ColumnSpec::string_list(GENERATION_GT),
                string_list_array(&rows.iter().map(|r| r.generation_gt.clone()).collect::<Vec<_>>()),
            ),
        ])
    }

    /// Corpus dataset from rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be assembled.
    pub fn from_corpus(rows: &[CorpusRow]) -> Result<Self> {
        use columns::{CONTENTS, DOC_ID, METADATA};
        Self::from_columns(vec![
            (ColumnSpec::utf8(DOC_ID), utf8_array(rows.iter().map(|r| &r.doc_id))),
            (ColumnSpec::utf8(CONTENTS), utf8_array(rows.iter().map(|r| &r.contents))),
            (
                ColumnSpec::utf8(METADATA).nullable(),
                optional_utf8_array(&rows.iter().map(|r| r.metadata.clone()).collect::<Vec<_>>()),
            ),
        ])
    }

    /// Chunk dataset from rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be assembled.
    pub fn from_chunks(rows: &[ChunkRow]) -> Result<Self> {
        use columns::{CHUNK_ID, CONTENTS, DOC_ID, END_IDX, START_IDX};
        Self::from_columns(vec![
            (ColumnSpec::utf8(DOC_ID), utf8_array(rows.iter().map(|r| &r.doc_id))),
            (
                ColumnSpec::uint32(CHUNK_ID),
                uint32_array(rows.iter().map(|r| r.chunk_id).collect()),
            ),
            (ColumnSpec::utf8(CONTENTS), utf8_array(rows.iter().map(|r| &r.contents))),
            (
                ColumnSpec::uint64(START_IDX),
                uint64_array(rows.iter().map(|r| r.start_idx).collect()),
            ),
            (
                ColumnSpec::uint64(END_IDX),
                uint64_array(rows.iter().map(|r| r.end_idx).collect()),
            ),
        ])
    }

    /// Underlying record batch.
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Arrow schema.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Declared view of the Arrow schema.
    #[must_use]
    pub fn schema_spec(&self) -> SchemaSpec {
        SchemaSpec::from_arrow(self.batch.schema().as_ref())
    }

    /// Column by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| Error::Storage(format!("column '{name}' not found")))
    }

    /// UTF-8 column values (nulls as empty strings).
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not UTF-8.
    pub fn strings(&self, name: &str) -> Result<Vec<String>> {
        arrays::read_strings(name, self.column(name)?.as_ref())
    }

    /// Nullable UTF-8 column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not UTF-8.
    pub fn optional_strings(&self, name: &str) -> Result<Vec<Option<String>>> {
        arrays::read_optional_strings(name, self.column(name)?.as_ref())
    }

    /// List-of-strings column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not a list of strings.
    pub fn string_lists(&self, name: &str) -> Result<Vec<Vec<String>>> {
        arrays::read_string_lists(name, self.column(name)?.as_ref())
    }

    /// List-of-float64 column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not a list of floats.
    pub fn float_lists(&self, name: &str) -> Result<Vec<Vec<f64>>> {
        arrays::read_float_lists(name, self.column(name)?.as_ref())
    }

    /// Float64 column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not Float64.
    pub fn f64s(&self, name: &str) -> Result<Vec<f64>> {
        arrays::read_f64s(name, self.column(name)?.as_ref())
    }

    /// UInt32 column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not UInt32.
    pub fn u32s(&self, name: &str) -> Result<Vec<u32>> {
        arrays::read_u32s(name, self.column(name)?.as_ref())
    }

    /// UInt64 column values.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is missing or not UInt64.
    pub fn u64s(&self, name: &str) -> Result<Vec<u64>> {
        arrays::read_u64s(name, self.column(name)?.as_ref())
    }

    /// New dataset with `columns` appended; same-named columns are replaced in place.
    ///
    /// # Errors
    ///
    /// Returns an error if an array length differs from the row count.
    pub fn with_columns(&self, columns: Vec<(ColumnSpec, ArrayRef)>) -> Result<Self> {
        let schema = self.batch.schema();
        let mut merged: Vec<(ColumnSpec, ArrayRef)> = schema
            .fields()
            .iter()
            .zip(self.batch.columns())
            .map(|(field, array)| {
                let mut spec = ColumnSpec::new(field.name().clone(), field.data_type().clone());
                if field.is_nullable() {
                    spec = spec.nullable();
                }
                (spec, Arc::clone(array))
            })
            .collect();
        for (spec, array) in columns {
            if array.len() != self.num_rows() {
                return Err(Error::Storage(format!(
                    "column '{}' has {} rows, dataset has {}",
                    spec.name(),
                    array.len(),
                    self.num_rows()
                )));
            }
            match merged.iter_mut().find(|(existing, _)| existing.name() == spec.name()) {
                Some(slot) => *slot = (spec, array),
                None => merged.push((spec, array)),
            }
        }
        if merged.is_empty() {
            return Ok(self.clone());
        }
        Self::from_columns(merged)
    }

    /// New dataset keeping only `names`, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if a column does not exist.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let schema = self.batch.schema();
        let indices = names
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .map_err(|_| Error::Storage(format!("column '{name}' not found")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            batch: self.batch.project(&indices)?,
        })
    }

    /// Check that every column of `required` is present with the declared type.
    ///
    /// # Errors
    ///
    /// Returns a storage error listing the missing columns.
    pub fn validate_schema(&self, required: &SchemaSpec) -> Result<()> {
        let missing = required.missing_from(&self.schema_spec());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Storage(format!(
                "dataset is missing required columns [{}]",
                missing.join(", ")
            )))
        }
    }

    /// Check that the `key` columns identify every row uniquely.
    ///
    /// # Errors
    ///
    /// Returns a storage error naming the first duplicated key.
    pub fn validate_unique_key(&self, key: &[&str]) -> Result<()> {
        let mut parts: Vec<Vec<Option<String>>> = Vec::with_capacity(key.len());
        for name in key {
            let column = self.column(name)?;
            let rendered = arrow::compute::cast(column, &DataType::Utf8)?;
            let strings = rendered
                .as_string_opt::<i32>()
                .ok_or_else(|| Error::Storage(format!("column '{name}' is not renderable")))?;
            parts.push(
                (0..strings.len())
                    .map(|i| (!strings.is_null(i)).then(|| strings.value(i).to_string()))
                    .collect(),
            );
        }
        let mut seen = HashSet::with_capacity(self.num_rows());
        for row in 0..self.num_rows() {
            let mut composite = Vec::with_capacity(key.len());
            for (name, values) in key.iter().zip(&parts) {
                let value = values[row].clone().ok_or_else(|| {
                    Error::Storage(format!("key column '{name}' is null at row {row}"))
                })?;
                composite.push(value);
            }
            if !seen.insert(composite.clone()) {
                return Err(Error::Storage(format!(
                    "duplicate key ({}) = ({})",
                    key.join(", "),
                    composite.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Validate schema and key for a dataset kind.
    ///
    /// # Errors
    ///
    /// Returns a storage error on missing columns or duplicate keys.
    pub fn validate_kind(&self, kind: DatasetKind) -> Result<()> {
        self.validate_schema(&kind.required_schema())?;
        self.validate_unique_key(kind.key())
    }
}
