//! Parquet sink with Hive-style table directories.
//!
//! Layout: `{root}/table={NAME}/part-{HASH}.parquet`, one part per append,
//! plus a `schema.json` sidecar written once the first part is in place.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Part names are the BLAKE3 hash of the part's content, so appending the
//!   same batch twice still yields two parts (the sequence number is hashed in)
//! - The sidecar fixes the column set; later batches may omit columns but
//!   not add new ones

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_columns, StorageError, StorageSink};
use crate::table::{ColumnDef, ColumnKind, TableBatch, Value};

const SCHEMA_FILE: &str = "schema.json";

/// Sidecar describing a table directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    pub created_at: chrono::NaiveDateTime,
}

pub struct ParquetSink {
    root: PathBuf,
    label: String,
}

impl ParquetSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = format!("parquet:{}", root.display());
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one table: `{root}/table={NAME}/`
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(format!("table={table}"))
    }

    fn schema_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(SCHEMA_FILE)
    }

    /// The table's sidecar, `None` when the table has never been written.
    /// An unreadable or unparsable sidecar is an error, not a new table.
    pub fn table_meta(&self, table: &str) -> Result<Option<TableMeta>, StorageError> {
        let path = self.schema_path(table);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))
    }

    /// Part files of a table, sorted by name.
    pub fn parts(&self, table: &str) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut parts = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StorageError::io(&dir, e))? {
            let path = entry.map_err(|e| StorageError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                parts.push(path);
            }
        }
        parts.sort();
        Ok(parts)
    }

    fn write_meta(&self, batch: &TableBatch) -> Result<(), StorageError> {
        let meta = TableMeta {
            table: batch.name.clone(),
            columns: batch.columns.clone(),
            created_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StorageError::Serialization(format!("table meta: {e}")))?;
        let path = self.schema_path(&batch.name);
        fs::write(&path, json).map_err(|e| StorageError::io(path, e))
    }
}

impl StorageSink for ParquetSink {
    fn name(&self) -> &str {
        &self.label
    }

    fn check(&self, batch: &TableBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        if let Some(meta) = self.table_meta(&batch.name)? {
            let existing: Vec<String> = meta.columns.into_iter().map(|c| c.name).collect();
            check_columns(batch, &existing)?;
        }
        Ok(())
    }

    fn append_rows(&mut self, batch: &TableBatch) -> Result<usize, StorageError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let dir = self.table_dir(&batch.name);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let meta = self.table_meta(&batch.name)?;
        if let Some(meta) = &meta {
            let existing: Vec<String> = meta.columns.iter().map(|c| c.name.clone()).collect();
            check_columns(batch, &existing)?;
        }

        let mut df = batch_to_dataframe(batch)?;
        let seq = self.parts(&batch.name)?.len();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seq.to_le_bytes());
        hasher.update(format!("{:?}", batch.rows).as_bytes());
        let hash = hasher.finalize().to_hex();
        let path = dir.join(format!("part-{seq:05}-{}.parquet", &hash[..16]));
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            StorageError::io(&path, e)
        })?;
        // sidecar only once a part exists
        if meta.is_none() {
            self.write_meta(batch)?;
        }

        debug!(table = %batch.name, rows = batch.len(), part = %path.display(), "appended");
        Ok(batch.len())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert a table batch to a Polars DataFrame using the declared kinds.
fn batch_to_dataframe(batch: &TableBatch) -> Result<DataFrame, StorageError> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let mut columns = Vec::with_capacity(batch.columns.len());

    for (idx, def) in batch.columns.iter().enumerate() {
        let cells = batch.rows.iter().map(|row| row.get(idx).unwrap_or(&Value::Null));
        let name: PlSmallStr = def.name.as_str().into();
        let column = match def.kind {
            ColumnKind::Integer => {
                let values: Vec<Option<i64>> = cells
                    .map(|v| match v {
                        Value::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                Column::new(name, values)
            }
            ColumnKind::Real => {
                let values: Vec<Option<f64>> = cells
                    .map(|v| match v {
                        Value::Real(r) => Some(*r),
                        Value::Integer(i) => Some(*i as f64),
                        _ => None,
                    })
                    .collect();
                Column::new(name, values)
            }
            ColumnKind::Text => {
                let values: Vec<Option<String>> = cells
                    .map(|v| match v {
                        Value::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                Column::new(name, values)
            }
            ColumnKind::Date => {
                let values: Vec<Option<i32>> = cells
                    .map(|v| match v {
                        Value::Date(d) => Some((*d - epoch).num_days() as i32),
                        _ => None,
                    })
                    .collect();
                Column::new(name, values)
                    .cast(&DataType::Date)
                    .map_err(|e| StorageError::Parquet(format!("date cast: {e}")))?
            }
        };
        columns.push(column);
    }

    DataFrame::new(columns).map_err(|e| StorageError::Parquet(format!("dataframe creation: {e}")))
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StorageError> {
    let file = fs::File::create(path).map_err(|e| StorageError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StorageError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
