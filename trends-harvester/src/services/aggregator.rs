//! Result aggregation and artifact files
//!
//! Reads claimed artifacts into [`RawTrend`]s, folds task results into the
//! shared [`MasterDataset`], and implements the file-level operations used by
//! sequential mode: tagging an artifact in place with its category and
//! merging tagged artifacts into one dataset.
//!
//! Everything here does blocking file I/O; async callers go through
//! `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use trends_common::{Category, CategoryRegistry};

use super::claim::claim_tag;
use crate::models::{MasterDataset, RawTrend, RetrievalOutcome, RetrievalResult, TrendRow, CATEGORY_COLUMN};

/// Artifact read/write errors
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File name carries no `_cat<id>_` tag, so its category is unknown
    #[error("artifact has no category tag: {0}")]
    UntaggedArtifact(PathBuf),

    #[error("artifact {path} tagged with unknown category id {id}")]
    UnknownCategory { path: PathBuf, id: u32 },
}

impl AggregateError {
    fn csv(path: &Path, source: csv::Error) -> Self {
        AggregateError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        AggregateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read an artifact, mapping columns by its own header
///
/// Unknown columns are ignored and missing ones stay empty. Rows whose known
/// fields are all blank are skipped. A header-only file yields no rows.
pub fn read_artifact(path: &Path) -> Result<Vec<RawTrend>, AggregateError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AggregateError::csv(path, e))?;

    let header = normalized_header(reader.headers().map_err(|e| AggregateError::csv(path, e))?);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AggregateError::csv(path, e))?;
        let mut trend = RawTrend::default();
        for (column, value) in header.iter().zip(record.iter()) {
            trend.set_field(column, value.trim().to_string());
        }
        if !trend.is_blank() {
            rows.push(trend);
        }
    }

    Ok(rows)
}

/// Artifact header without any injected `Category` column
pub fn read_artifact_header(path: &Path) -> Result<Vec<String>, AggregateError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AggregateError::csv(path, e))?;
    let header = normalized_header(reader.headers().map_err(|e| AggregateError::csv(path, e))?);
    Ok(header.into_iter().filter(|c| c != CATEGORY_COLUMN).collect())
}

fn normalized_header(record: &csv::StringRecord) -> Vec<String> {
    record
        .iter()
        .map(|c| c.trim_start_matches('\u{feff}').trim().to_string())
        .collect()
}

/// Tag raw trends with their category
pub fn tag_rows(category: &Category, rows: Vec<RawTrend>) -> Vec<TrendRow> {
    rows.into_iter()
        .map(|trend| TrendRow {
            category: category.name.to_string(),
            category_id: category.id,
            trend,
        })
        .collect()
}

/// Thread-safe accumulator for one harvest
///
/// The lock is held only to extend the row vector; tagging happens before
/// it is taken.
#[derive(Debug, Default)]
pub struct Aggregator {
    dataset: Mutex<MasterDataset>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one task result in; returns the number of rows added
    pub fn append(&self, result: &RetrievalResult) -> usize {
        let rows = match &result.outcome {
            RetrievalOutcome::Success { rows, .. } => tag_rows(&result.task.category, rows.clone()),
            RetrievalOutcome::Empty | RetrievalOutcome::Failed(_) => return 0,
        };
        let added = rows.len();

        let mut dataset = self.dataset.lock().unwrap_or_else(|e| e.into_inner());
        dataset.rows.extend(rows);
        added
    }

    pub fn row_count(&self) -> usize {
        self.dataset.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn into_dataset(self) -> MasterDataset {
        self.dataset.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Rewrite an artifact in place with a leading `Category` column
///
/// Already-tagged files are left untouched. Returns the number of data rows.
pub fn tag_artifact(path: &Path, category: &Category) -> Result<usize, AggregateError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| AggregateError::csv(path, e))?;
    let header = reader.headers().map_err(|e| AggregateError::csv(path, e))?.clone();

    if header.iter().next().map(|c| c.trim_start_matches('\u{feff}')) == Some(CATEGORY_COLUMN) {
        let rows = reader.records().filter(|r| r.is_ok()).count();
        return Ok(rows);
    }

    let tmp_path = path.with_extension("tagging.tmp");
    let written = write_tagged(&mut reader, &header, path, &tmp_path, category)
        .and_then(|rows| std::fs::rename(&tmp_path, path).map(|_| rows).map_err(|e| AggregateError::io(path, e)));
    let rows = match written {
        Ok(rows) => rows,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(file = %tmp_path.display(), error = %cleanup, "Temporary tagging file not removed");
                }
            }
            return Err(e);
        }
    };

    tracing::debug!(file = %path.display(), category = category.name, rows, "Artifact tagged");
    Ok(rows)
}

fn write_tagged(
    reader: &mut csv::Reader<std::fs::File>,
    header: &csv::StringRecord,
    path: &Path,
    tmp_path: &Path,
    category: &Category,
) -> Result<usize, AggregateError> {
    let mut writer = csv::Writer::from_path(tmp_path).map_err(|e| AggregateError::csv(tmp_path, e))?;

    let tagged_header = std::iter::once(CATEGORY_COLUMN).chain(header.iter());
    writer
        .write_record(tagged_header)
        .map_err(|e| AggregateError::csv(tmp_path, e))?;

    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| AggregateError::csv(path, e))?;
        writer
            .write_record(std::iter::once(category.name).chain(record.iter()))
            .map_err(|e| AggregateError::csv(tmp_path, e))?;
        rows += 1;
    }
    writer.flush().map_err(|e| AggregateError::io(tmp_path, e))?;
    Ok(rows)
}

/// Tagged artifacts in `dir`, sorted by file name
pub fn collect_tagged_artifacts(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, AggregateError> {
    let entries = std::fs::read_dir(dir).map_err(|e| AggregateError::io(dir, e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AggregateError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let ext_matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if path.is_file() && ext_matches && claim_tag(&name).is_some() {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Merge tagged artifacts into one dataset
///
/// Files are processed in file-name order, so the same inputs always produce
/// the same row order. The master header is `Category` plus the header of the
/// first file; every file is mapped by its own header. The category of each
/// file comes from its `_cat<id>_` tag.
pub fn merge_artifacts(paths: &[PathBuf]) -> Result<MasterDataset, AggregateError> {
    let registry = CategoryRegistry::global();

    let mut ordered: Vec<&PathBuf> = paths.iter().collect();
    ordered.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut dataset = match ordered.first() {
        Some(first) => {
            let header = std::iter::once(CATEGORY_COLUMN.to_string())
                .chain(read_artifact_header(first)?)
                .collect();
            MasterDataset::with_header(header)
        }
        None => MasterDataset::new(),
    };

    for path in ordered {
        let category = artifact_category(path, registry)?;
        let rows = read_artifact(path)?;
        tracing::debug!(file = %path.display(), category = category.name, rows = rows.len(), "Merging artifact");
        dataset.rows.extend(tag_rows(category, rows));
    }

    Ok(dataset)
}

fn artifact_category<'r>(path: &Path, registry: &'r CategoryRegistry) -> Result<&'r Category, AggregateError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = claim_tag(&name).ok_or_else(|| AggregateError::UntaggedArtifact(path.to_path_buf()))?;
    registry.by_id(id).map_err(|_| AggregateError::UnknownCategory {
        path: path.to_path_buf(),
        id,
    })
}

/// Write a dataset as CSV (header row first)
pub fn write_csv(dataset: &MasterDataset, path: &Path) -> Result<(), AggregateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AggregateError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| AggregateError::csv(path, e))?;
    writer
        .write_record(&dataset.header)
        .map_err(|e| AggregateError::csv(path, e))?;
    for row in &dataset.rows {
        writer
            .write_record(dataset.record(row))
            .map_err(|e| AggregateError::csv(path, e))?;
    }
    writer.flush().map_err(|e| AggregateError::io(path, e))?;
    Ok(())
}
