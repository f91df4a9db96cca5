//! `plain_text` parse module: file listing -> parsed documents

use crate::component::{
    ComponentError, ComponentResult, ModuleContract, ParamKind, ParamSpec, StageInput,
    StageKind, StageModule, StageOutput,
};
use crate::dataset::{columns, utf8_array, Dataset, DatasetKind};
use crate::schema::ColumnSpec;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::Path;

/// Reads every listed file as UTF-8 text.
///
/// `doc_id` is the file stem; a stem already issued gets the first free
/// `_{n}` suffix so the parsed dataset keeps a unique key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    /// Declared contract.
    #[must_use]
    pub fn contract() -> ModuleContract {
        ModuleContract::new(StageKind::Parse)
            .requires(DatasetKind::FileListing.required_schema())
            .produces(DatasetKind::Parsed.required_schema())
            .param(ParamSpec::with_default(
                "concurrency",
                ParamKind::PositiveInteger,
                8,
            ))
    }
}

/// Document ids for `paths`, in order: file stems made unique with `_{n}`.
#[must_use]
pub fn unique_doc_ids(paths: &[String]) -> Vec<String> {
    let mut issued: HashSet<String> = HashSet::with_capacity(paths.len());
    paths
        .iter()
        .map(|path| {
            let stem = Path::new(path)
                .file_stem()
                .map_or_else(|| path.clone(), |s| s.to_string_lossy().into_owned());
            let mut id = stem.clone();
            let mut n = 1;
            while issued.contains(&id) {
                id = format!("{stem}_{n}");
                n += 1;
            }
            issued.insert(id.clone());
            id
        })
        .collect()
}

#[async_trait]
impl StageModule for PlainTextParser {
    async fn run(&self, input: StageInput<'_>) -> ComponentResult<StageOutput> {
        let paths = input.dataset.strings(columns::PATH)?;
        let concurrency = input.usize_param("concurrency")?;

        let contents: Vec<String> = stream::iter(paths.iter().cloned())
            .map(|path| async move {
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    ComponentError::fatal(format!("cannot read {path}")).with_source(e)
                })
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let doc_ids = unique_doc_ids(&paths);

        let dataset = Dataset::from_columns(vec![
            (ColumnSpec::utf8(columns::DOC_ID), utf8_array(&doc_ids)),
            (ColumnSpec::utf8(columns::PATH), utf8_array(&paths)),
            (ColumnSpec::utf8(columns::CONTENTS), utf8_array(&contents)),
        ])?;
        Ok(StageOutput::new(dataset))
    }
}
