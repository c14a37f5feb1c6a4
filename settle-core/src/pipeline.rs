//! Orchestration: parse, dedupe, build tables and append them to a sink.
//!
//! Single-file mode (`ingest_file`) returns the first error to the caller.
//! Batch mode (`ingest_paths`) isolates failures per file: a broken file is
//! logged with its name and recorded, and the remaining files continue.
//! Parsing runs in parallel; writes go through one lock so a sink never sees
//! two files at once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::batch::{self, SkippedGroup};
use crate::dedupe::dedupe;
use crate::error::{FileError, IngestError};
use crate::progress::Progress;
use crate::storage::{StorageError, StorageSink};
use crate::table::{build_tables, TableBatch, TableLayout};
use crate::transfer::{select_current_files, LocalDirClient, TransferClient, TransferError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Storage-ready output of one file.
#[derive(Debug, Default)]
pub struct FileOutput {
    pub tables: Vec<TableBatch>,
    /// Observation rows parsed (equals the market-table row count).
    pub rows: usize,
    pub groups: usize,
    pub skipped: Vec<SkippedGroup>,
}

/// What one file contributed to the sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub filename: String,
    /// `(table, rows appended)` in write order.
    pub tables: Vec<(String, usize)>,
    pub rows_written: usize,
    pub skipped_groups: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub layout: TableLayout,
    /// Parse threads; 0 uses every available core.
    pub workers: usize,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows appended across all tables and files.
    pub rows_written: usize,
    /// Reports of the successful files, in input order.
    pub reports: Vec<FileReport>,
    pub errors: Vec<FileError>,
}

impl IngestSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Parse → dedupe → tables, with no I/O.
pub fn process_bytes(
    filename: &str,
    bytes: &[u8],
    layout: TableLayout,
) -> Result<FileOutput, IngestError> {
    let parsed = batch::parse(bytes)?;
    let rows = parsed.rows.len();
    let deduped = dedupe(parsed.rows);
    debug!(
        file = filename,
        rows,
        underlyings = deduped.underlyings.len(),
        instruments = deduped.instruments.len(),
        "deduplicated"
    );
    Ok(FileOutput {
        tables: build_tables(filename, &deduped, layout),
        rows,
        groups: parsed.groups,
        skipped: parsed.skipped,
    })
}

/// Process one file and append its tables. Every table is checked against
/// the sink before any is appended, so a schema refusal leaves the sink
/// untouched.
pub fn ingest_file(
    filename: &str,
    bytes: &[u8],
    layout: TableLayout,
    sink: &mut dyn StorageSink,
) -> Result<FileReport, FileError> {
    let output = process_bytes(filename, bytes, layout).map_err(|e| FileError::new(filename, e))?;
    write_output(filename, &output, sink).map_err(|e| FileError::new(filename, e))
}

fn write_output(
    filename: &str,
    output: &FileOutput,
    sink: &mut dyn StorageSink,
) -> Result<FileReport, StorageError> {
    let mut report = FileReport {
        filename: filename.to_string(),
        skipped_groups: output.skipped.len(),
        ..Default::default()
    };
    for table in &output.tables {
        sink.check(table)?;
    }
    for table in &output.tables {
        let written = sink.append_rows(table)?;
        debug!(file = filename, table = %table.name, rows = written, sink = sink.name(), "appended");
        report.rows_written += written;
        report.tables.push((table.name.clone(), written));
    }
    Ok(report)
}

/// Base name of `path`, used as the file identity for routing and reports.
fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Batch ingest of local files.
///
/// Returns `Err` only when the worker pool cannot be built; per-file
/// failures are collected in the summary.
pub fn ingest_paths(
    paths: &[PathBuf],
    sink: &mut dyn StorageSink,
    options: PipelineOptions,
    progress: &dyn Progress,
) -> Result<IngestSummary, PipelineError> {
    let total = paths.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .thread_name(|i| format!("settle-ingest-{i}"))
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    info!(files = total, sink = sink.name(), layout = %options.layout, "ingesting");
    let sink = Mutex::new(sink);

    let results: Vec<Result<FileReport, FileError>> = pool.install(|| {
        paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| {
                let filename = file_label(path);
                progress.on_start(&filename, i, total);

                let result = fs::read(path)
                    .map_err(|e| IngestError::from(TransferError::io(path, e)))
                    .and_then(|bytes| process_bytes(&filename, &bytes, options.layout))
                    .and_then(|output| {
                        let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        write_output(&filename, &output, &mut **guard).map_err(IngestError::from)
                    })
                    .map_err(|e| FileError::new(&filename, e));

                match &result {
                    Ok(_) => progress.on_complete(&filename, i, total, None),
                    Err(e) => {
                        warn!(file = %filename, error = %e.source, "file failed");
                        progress.on_complete(&filename, i, total, Some(&e.source.to_string()));
                    }
                }
                result
            })
            .collect()
    });

    let mut summary = IngestSummary {
        total,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(report) => {
                summary.succeeded += 1;
                summary.rows_written += report.rows_written;
                summary.reports.push(report);
            }
            Err(e) => {
                summary.failed += 1;
                summary.errors.push(e);
            }
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, total);
    Ok(summary)
}

/// Cached settlement files in `dir` ending with `suffix`, optionally limited
/// to one `YYYYMMDD` date token. Sorted by name.
pub fn cached_files(
    dir: &Path,
    suffix: &str,
    date_token: Option<&str>,
) -> Result<Vec<PathBuf>, TransferError> {
    let mut local = LocalDirClient::new(dir);
    let names = local.list_remote_files()?;
    let selected = select_current_files(&names, date_token.unwrap_or(""), suffix);
    Ok(selected.into_iter().map(|n| dir.join(n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::storage::MemorySink;
    use crate::table::{INSTRUMENT_TABLE, UNDERLYING_TABLE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ES_FUTURE: &str = r#"<FIXML><Batch>
        <MktDataFull BizDt="2024-03-15">
          <Instrmt Sym="ES" Exch="CME" MMY="202403" SecTyp="FUT"/>
          <Full Typ="6" Px="5100.25"/>
          <Full Typ="B" Sz="1250"/>
        </MktDataFull>
        <MktDataFull BizDt="2024-03-15">
          <Instrmt Sym="ES" Exch="CME" MMY="202403" SecTyp="FUT"/>
          <Full Typ="6" Px="5101.00"/>
        </MktDataFull>
    </Batch></FIXML>"#;

    #[test]
    fn process_bytes_builds_deduplicated_tables() {
        let output = process_bytes("cme.settle.20240315.s.xml", ES_FUTURE.as_bytes(), TableLayout::Routed)
            .unwrap();
        assert_eq!(output.rows, 3);
        assert_eq!(output.groups, 2);

        let names: Vec<&str> = output.tables.iter().map(|t| t.name.as_str()).collect();
        // no Undly element, so no underlying table
        assert_eq!(names, vec![INSTRUMENT_TABLE, "cme"]);
        assert_eq!(output.tables[0].len(), 1);
        assert_eq!(output.tables[1].len(), 3);
    }

    #[test]
    fn ingest_file_reports_per_table_counts() {
        let mut sink = MemorySink::new();
        let report = ingest_file(
            "cme.fwd.settle.20240315.s.xml",
            ES_FUTURE.as_bytes(),
            TableLayout::Routed,
            &mut sink,
        )
        .unwrap();
        assert_eq!(report.rows_written, 4);
        assert_eq!(
            report.tables,
            vec![(INSTRUMENT_TABLE.to_string(), 1), ("cme_settle".to_string(), 3)]
        );
        assert_eq!(sink.row_count(UNDERLYING_TABLE), 0);
    }

    #[test]
    fn ingest_file_error_names_the_file() {
        let mut sink = MemorySink::new();
        let err = ingest_file("bad.s.xml", b"<FIXML>", TableLayout::Routed, &mut sink).unwrap_err();
        assert_eq!(err.filename, "bad.s.xml");
        assert!(matches!(err.source, IngestError::Parse(_)));
    }

    struct CountingProgress {
        started: AtomicUsize,
        failed: AtomicUsize,
    }

    impl Progress for CountingProgress {
        fn on_start(&self, _file: &str, _index: usize, _total: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_complete(&self, _file: &str, _index: usize, _total: usize, error: Option<&str>) {
            if error.is_some() {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
    }

    #[test]
    fn batch_continues_past_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("cme.settle.20240315.s.xml");
        let broken = dir.path().join("nymex.settle.20240315.s.xml");
        fs::write(&good, ES_FUTURE).unwrap();
        fs::write(&broken, "<FIXML><Batch>").unwrap();
        let missing = dir.path().join("cbt.settle.20240315.s.xml");

        let progress = CountingProgress {
            started: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };
        let mut sink = MemorySink::new();
        let summary = ingest_paths(
            &[good, broken, missing],
            &mut sink,
            PipelineOptions {
                workers: 2,
                ..Default::default()
            },
            &progress,
        )
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.rows_written, 4);
        assert_eq!(progress.started.load(Ordering::SeqCst), 3);
        assert_eq!(progress.failed.load(Ordering::SeqCst), 2);

        let mut failed: Vec<&str> = summary.errors.iter().map(|e| e.filename.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["cbt.settle.20240315.s.xml", "nymex.settle.20240315.s.xml"]);
        assert_eq!(sink.row_count("cme"), 3);
    }

    #[test]
    fn single_layout_shares_one_market_table() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("cme.settle.20240315.s.xml");
        let b = dir.path().join("cme.fwd.settle.20240315.s.xml");
        fs::write(&a, ES_FUTURE).unwrap();
        fs::write(&b, ES_FUTURE).unwrap();

        let mut sink = MemorySink::new();
        let summary = ingest_paths(
            &[a, b],
            &mut sink,
            PipelineOptions {
                layout: TableLayout::Single,
                workers: 1,
            },
            &NoProgress,
        )
        .unwrap();

        assert!(summary.all_succeeded());
        assert_eq!(sink.row_count("market_data"), 6);
        // entity tables are append-only, each file adds its own copy
        assert_eq!(sink.row_count(INSTRUMENT_TABLE), 2);
    }

    #[test]
    fn refused_market_table_leaves_entity_tables_untouched() {
        let px_only = r#"<FIXML><Batch><MktDataFull BizDt="2024-03-15">
            <Instrmt Sym="ES" Exch="CME" MMY="202403"/><Undly ID="ES" Exch="CME" MMY="202403"/>
            <Full Typ="6" Px="5100.25"/>
        </MktDataFull></Batch></FIXML>"#;
        let px_and_sz = r#"<FIXML><Batch><MktDataFull BizDt="2024-03-18">
            <Instrmt Sym="NQ" Exch="CME" MMY="202406"/><Undly ID="NQ" Exch="CME" MMY="202406"/>
            <Full Typ="6" Px="18000.5" Sz="12"/>
        </MktDataFull></Batch></FIXML>"#;

        let mut sink = MemorySink::new();
        ingest_file("a.s.xml", px_only.as_bytes(), TableLayout::Single, &mut sink).unwrap();
        assert_eq!(sink.row_count(INSTRUMENT_TABLE), 1);
        assert_eq!(sink.row_count(UNDERLYING_TABLE), 1);

        let err = ingest_file("b.s.xml", px_and_sz.as_bytes(), TableLayout::Single, &mut sink)
            .unwrap_err();
        assert_eq!(err.filename, "b.s.xml");
        assert!(matches!(
            err.source,
            IngestError::Storage(StorageError::SchemaMismatch { ref column, .. }) if column == "Sz"
        ));
        assert_eq!(sink.row_count(INSTRUMENT_TABLE), 1);
        assert_eq!(sink.row_count(UNDERLYING_TABLE), 1);
        assert_eq!(sink.row_count("market_data"), 1);
    }

    #[test]
    fn cached_files_filters_by_suffix_and_date() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "cme.settle.20240315.s.xml",
            "cme.settle.20240314.s.xml",
            "cme.settle.20240315.e.xml",
            "cme.settle.20240315.s.xml.tmp",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let all = cached_files(dir.path(), "s.xml", None).unwrap();
        assert_eq!(all.len(), 2);
        let today = cached_files(dir.path(), "s.xml", Some("20240315")).unwrap();
        assert_eq!(today, vec![dir.path().join("cme.settle.20240315.s.xml")]);
    }
}
