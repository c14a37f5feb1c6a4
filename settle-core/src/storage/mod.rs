//! Append-only storage sinks.
//!
//! A sink creates a table from the first batch it sees for that name and
//! appends on every later call. There is no upsert and no key conflict
//! detection; a batch carrying a column the table does not have is refused
//! rather than migrated.

pub mod memory;
pub mod parquet;
pub mod sqlite;

use std::path::PathBuf;

use thiserror::Error;

use crate::table::TableBatch;

pub use memory::MemorySink;
pub use parquet::ParquetSink;
pub use sqlite::SqliteSink;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported storage uri '{0}' (expected sqlite://<path> or parquet://<dir>)")]
    UnsupportedUri(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("parquet: {0}")]
    Parquet(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{table}' has no column '{column}'")]
    SchemaMismatch { table: String, column: String },

    #[error("serialization: {0}")]
    Serialization(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Destination for table batches.
pub trait StorageSink: Send {
    /// Human-readable destination, for logs.
    fn name(&self) -> &str;

    /// Check that `batch` could be appended without writing anything.
    /// Fails with the same error `append_rows` would give for a column the
    /// stored table lacks.
    fn check(&self, batch: &TableBatch) -> Result<(), StorageError>;

    /// Append every row of `batch`, creating the table on first use.
    /// Returns the number of rows written.
    fn append_rows(&mut self, batch: &TableBatch) -> Result<usize, StorageError>;
}

/// A parsed storage destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// `sqlite://cme.sqlite`, `sqlite:///cme.sqlite`, `sqlite:////abs/cme.sqlite`,
    /// `sqlite://:memory:`
    Sqlite(PathBuf),
    /// `parquet://out/settle`
    Parquet(PathBuf),
}

impl StorageUri {
    /// Parse a destination uri. The `sqlite:///relative` form follows the
    /// SQLAlchemy convention: three slashes for a relative path, four for an
    /// absolute one.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let unsupported = || StorageError::UnsupportedUri(uri.to_string());
        if let Some(rest) = uri.strip_prefix("sqlite://") {
            let path = rest.strip_prefix('/').unwrap_or(rest);
            if path.is_empty() {
                return Err(unsupported());
            }
            return Ok(StorageUri::Sqlite(PathBuf::from(path)));
        }
        if let Some(rest) = uri.strip_prefix("parquet://") {
            if rest.is_empty() {
                return Err(unsupported());
            }
            return Ok(StorageUri::Parquet(PathBuf::from(rest)));
        }
        Err(unsupported())
    }
}

/// Open the sink a uri points at.
pub fn open_sink(uri: &str) -> Result<Box<dyn StorageSink>, StorageError> {
    match StorageUri::parse(uri)? {
        StorageUri::Sqlite(path) if path.as_os_str() == ":memory:" => {
            Ok(Box::new(SqliteSink::in_memory()?))
        }
        StorageUri::Sqlite(path) => Ok(Box::new(SqliteSink::open(path)?)),
        StorageUri::Parquet(dir) => Ok(Box::new(ParquetSink::new(dir))),
    }
}

/// Check that every column of `batch` exists in `existing`.
pub(crate) fn check_columns(batch: &TableBatch, existing: &[String]) -> Result<(), StorageError> {
    for column in batch.column_names() {
        if !existing.iter().any(|c| c == column) {
            return Err(StorageError::SchemaMismatch {
                table: batch.name.clone(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}
