//! Error taxonomy shared by the ingestion pipeline.
//!
//! Each layer owns its own error enum (`ParseError`, `TransferError`,
//! `StorageError`); `IngestError` is the umbrella the pipeline propagates.
//! The orchestrator decides continue-vs-abort, the core never swallows.

use thiserror::Error;

use crate::batch::ParseError;
use crate::storage::StorageError;
use crate::transfer::TransferError;

/// Errors raised while turning one settlement file into storage rows.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required identity attribute is absent from a raw record.
    #[error("{entity} record is missing required attribute '{field}'")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    /// A date-like attribute does not match its fixed format.
    #[error("malformed date in '{field}': {value:?}")]
    MalformedDate { field: String, value: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IngestError {
    /// Whether the error only disqualifies a single record, not the file.
    pub fn is_record_level(&self) -> bool {
        matches!(self, IngestError::MissingField { .. })
    }
}

/// An `IngestError` tagged with the file being processed.
#[derive(Debug, Error)]
#[error("{filename}: {source}")]
pub struct FileError {
    pub filename: String,
    #[source]
    pub source: IngestError,
}

impl FileError {
    pub fn new(filename: impl Into<String>, source: impl Into<IngestError>) -> Self {
        Self {
            filename: filename.into(),
            source: source.into(),
        }
    }
}
