//! Tabular storage backend (Arrow/Parquet)
//!
//! **Artifact Write Pattern** (write-once):
//! - Every stage output is written once as a single Parquet file
//! - Writes go to `<file>.tmp`, are fsynced, then renamed into place, so a
//!   crashed run never leaves a truncated artifact under the final name
//! - Files are never updated in place; a re-run writes a new file
//!
//! Loads concatenate all row groups into one `Dataset` and validate the
//! schema (and, for known dataset kinds, the unique row key).

use crate::dataset::{corpus_from_text_lines, Dataset, DatasetKind};
use crate::schema::SchemaSpec;
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Parquet reader/writer for datasets
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularStore;

impl TabularStore {
    /// Load a Parquet file into a single dataset
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Storage(format!("Failed to open Parquet file {}: {e}", path.display()))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::Storage(format!("Failed to parse Parquet file {}: {e}", path.display()))
        })?;
        let schema = builder.schema().clone();

        let reader = builder.build().map_err(|e| {
            Error::Storage(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::Storage(format!("Failed to read record batch: {e}"))
            })?;
            batches.push(batch);
        }

        let batch = match batches.len() {
            0 => RecordBatch::new_empty(schema),
            1 => batches.remove(0),
            _ => arrow::compute::concat_batches(&schema, &batches)?,
        };
        Ok(Dataset::new(batch))
    }

    /// Load a Parquet file and check it provides `required`
    ///
    /// # Errors
    /// Returns error if the file cannot be read or required columns are missing
    pub fn load<P: AsRef<Path>>(path: P, required: &SchemaSpec) -> Result<Dataset> {
        let path = path.as_ref();
        let dataset = Self::load_parquet(path)?;
        dataset
            .validate_schema(required)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
        Ok(dataset)
    }

    /// Load a Parquet file as a dataset kind (schema + unique key validated)
    ///
    /// # Errors
    /// Returns error if the file cannot be read, columns are missing or keys repeat
    pub fn load_kind<P: AsRef<Path>>(path: P, kind: DatasetKind) -> Result<Dataset> {
        let path = path.as_ref();
        let dataset = Self::load_parquet(path)?;
        dataset
            .validate_kind(kind)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
        Ok(dataset)
    }

    /// Write a dataset as a Parquet file (atomic rename), returning its size in bytes
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn write_parquet<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<u64> {
        let path = path.as_ref();
        let tmp = tmp_path(path);

        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, dataset.schema(), None)?;
        if !dataset.is_empty() {
            writer.write(dataset.batch())?;
        }
        writer.close()?;

        File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(fs::metadata(path)?.len())
    }

    /// Write a small file (trial record, summary, frozen config) atomically
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let tmp = tmp_path(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Convert a text file into a line corpus Parquet file
    ///
    /// # Errors
    /// Returns error if the text cannot be read or the Parquet file cannot be written
    pub fn text_file_to_parquet<P: AsRef<Path>, Q: AsRef<Path>>(
        text_path: P,
        parquet_path: Q,
    ) -> Result<Dataset> {
        let text = fs::read_to_string(text_path.as_ref())?;
        let corpus = corpus_from_text_lines(&text)?;
        Self::write_parquet(parquet_path, &corpus)?;
        Ok(corpus)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
