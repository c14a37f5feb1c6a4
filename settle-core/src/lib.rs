//! Settle Core: ingestion of exchange end-of-day settlement batches.
//!
//! A settlement file is a FIXML batch of instrument groups, each carrying
//! the instrument, an optional underlying, and a list of quote records.
//! This crate turns such files into relational tables:
//! - Entity model (underlyings, instruments, observation rows) with
//!   identity-based equality
//! - Batch parser flattening every quote record into one row
//! - Per-file deduplication of entities and routing of rows to tables
//! - Transfer clients (FTP, local directory) and the download cache
//! - Append-only storage sinks (SQLite, Parquet, in-memory)
//! - Single-file and parallel batch orchestration

pub mod batch;
pub mod config;
pub mod dedupe;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod routing;
pub mod storage;
pub mod table;
pub mod transfer;

pub use config::IngestConfig;
pub use error::{FileError, IngestError};
pub use pipeline::{ingest_file, ingest_paths, process_bytes, IngestSummary, PipelineOptions};
pub use routing::route_table_name;
pub use storage::{open_sink, StorageSink};
pub use table::TableLayout;
