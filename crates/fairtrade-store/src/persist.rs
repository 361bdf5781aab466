//! On-disk index snapshots.
//!
//! A snapshot directory holds `units.arrow` (Arrow IPC file, one row per unit
//! with a `FixedSizeList<Float32, dims>` embedding column) and `manifest.json`.
//! Writes go to a `.staging` sibling first, which then replaces the live
//! directory by rename. The live directory is moved to `.old` for the
//! duration of the swap; a reader finding only `.old` moves it back.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, FixedSizeListBuilder, Float32Array, Float32Builder, StringArray,
    UInt32Array,
};
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use fairtrade_core::RetrievableUnit;
use fairtrade_core::schema::index as cols;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StoreError;
use crate::index::{IndexEntry, Snapshot};

const FORMAT_VERSION: u32 = 1;
const UNITS_FILE: &str = "units.arrow";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: String,
    dimensions: usize,
    units: usize,
    built_at: DateTime<Utc>,
}

/// True when `dir` holds a persisted index.
pub fn index_exists(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

pub(crate) fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let staging = sibling(dir, "staging");
    let old = sibling(dir, "old");

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    write_units(&staging.join(UNITS_FILE), snapshot)?;
    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: snapshot.model.clone(),
        dimensions: snapshot.dims,
        units: snapshot.entries.len(),
        built_at: snapshot.built_at,
    };
    fs::write(
        staging.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    if old.exists() {
        fs::remove_dir_all(&old)?;
    }
    if dir.exists() {
        fs::rename(dir, &old)?;
    }
    fs::rename(&staging, dir)?;
    if old.exists()
        && let Err(e) = fs::remove_dir_all(&old)
    {
        warn!(path = %old.display(), error = %e, "could not remove previous index");
    }

    debug!(dir = %dir.display(), units = manifest.units, "index snapshot written");
    Ok(())
}

/// Load the snapshot in `dir`, or `None` when nothing has been persisted.
pub(crate) fn read_snapshot(dir: &Path) -> Result<Option<Snapshot>, StoreError> {
    recover_interrupted_swap(dir)?;
    if !index_exists(dir) {
        return Ok(None);
    }

    let manifest: Manifest = serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported index format version {}",
            manifest.format_version
        )));
    }

    let entries = read_units(&dir.join(UNITS_FILE), manifest.dimensions)?;
    if entries.len() != manifest.units {
        return Err(StoreError::Corrupt(format!(
            "manifest lists {} units, file has {}",
            manifest.units,
            entries.len()
        )));
    }

    Ok(Some(Snapshot {
        entries,
        dims: manifest.dimensions,
        model: manifest.model,
        built_at: manifest.built_at,
    }))
}

fn recover_interrupted_swap(dir: &Path) -> Result<(), StoreError> {
    let old = sibling(dir, "old");
    if !dir.exists() && index_exists(&old) {
        fs::rename(&old, dir)?;
        warn!(dir = %dir.display(), "restored index left by an interrupted swap");
    }
    Ok(())
}

fn write_units(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let schema = Arc::new(cols::unit_index_schema(snapshot.dims));
    let entries = &snapshot.entries;

    let mut embeddings = FixedSizeListBuilder::new(Float32Builder::new(), snapshot.dims as i32);
    for entry in entries {
        embeddings.values().append_slice(&entry.vector);
        embeddings.append(true);
    }

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(
                entries.iter().map(|e| e.unit.unit_id.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                entries.iter().map(|e| e.unit.law_title.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                entries.iter().map(|e| e.unit.article_number.as_str()),
            )),
            Arc::new(UInt32Array::from_iter_values(
                entries.iter().map(|e| e.unit.part),
            )),
            Arc::new(StringArray::from_iter_values(
                entries.iter().map(|e| e.unit.text.as_str()),
            )),
            Arc::new(embeddings.finish()),
        ],
    )?;

    let mut writer = FileWriter::try_new(File::create(path)?, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}

fn read_units(path: &Path, dims: usize) -> Result<Vec<IndexEntry>, StoreError> {
    let reader = FileReader::try_new(File::open(path)?, None)?;
    let mut entries = Vec::new();

    for batch in reader {
        let batch = batch?;
        let unit_ids = string_column(&batch, cols::UNIT_ID)?;
        let titles = string_column(&batch, cols::LAW_TITLE)?;
        let numbers = string_column(&batch, cols::ARTICLE_NUMBER)?;
        let texts = string_column(&batch, cols::TEXT)?;
        let parts = batch
            .column_by_name(cols::PART)
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
            .ok_or_else(|| StoreError::Corrupt(format!("missing '{}' column", cols::PART)))?;
        let embeddings = batch
            .column_by_name(cols::EMBEDDING)
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| {
                StoreError::Corrupt(format!("missing '{}' column", cols::EMBEDDING))
            })?;
        if embeddings.value_length() as usize != dims {
            return Err(StoreError::DimensionMismatch {
                expected: dims,
                got: embeddings.value_length() as usize,
            });
        }
        let values = embeddings
            .values()
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| StoreError::Corrupt("embedding values are not Float32".into()))?;

        for row in 0..batch.num_rows() {
            let offset = row * dims;
            entries.push(IndexEntry {
                unit: RetrievableUnit {
                    unit_id: unit_ids.value(row).to_string(),
                    text: texts.value(row).to_string(),
                    law_title: titles.value(row).to_string(),
                    article_number: numbers.value(row).to_string(),
                    part: parts.value(row),
                },
                vector: values.values()[offset..offset + dims].to_vec(),
            });
        }
    }

    Ok(entries)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Corrupt(format!("missing '{name}' column")))
}

/// `law_index` -> `law_index.staging`, next to the original.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}
