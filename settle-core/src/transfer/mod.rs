//! File transfer: listing, date selection and download into a local cache.
//!
//! The `TransferClient` trait abstracts over the source (the exchange FTP
//! server, or a local directory) so the pipeline and tests never depend on
//! the network. No retries happen here; a failed download is reported and
//! the caller decides what to do.

pub mod ftp;
pub mod local;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::progress::Progress;

pub use ftp::FtpClient;
pub use local::LocalDirClient;

/// Default suffix of settlement batch files.
pub const SETTLE_SUFFIX: &str = "s.xml";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("login as '{user}' failed: {reason}")]
    Login { user: String, reason: String },

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("download of '{name}' failed: {reason}")]
    Download { name: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A source of settlement files.
pub trait TransferClient {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Filenames available at the settle path.
    fn list_remote_files(&mut self) -> Result<Vec<String>, TransferError>;

    /// Raw content of one file.
    fn download_file(&mut self, name: &str) -> Result<Vec<u8>, TransferError>;
}

/// Select the files of one business date.
///
/// A name is kept when it contains the `YYYYMMDD` token and ends with
/// `suffix`. The result is sorted and free of duplicates.
pub fn select_current_files<S: AsRef<str>>(names: &[S], date_token: &str, suffix: &str) -> Vec<String> {
    names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| n.ends_with(suffix) && n.contains(date_token))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Write bytes to `dir/name` atomically: write a `.tmp` sibling, then rename.
pub fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, TransferError> {
    fs::create_dir_all(dir).map_err(|e| TransferError::io(dir, e))?;
    let path = dir.join(name);
    let tmp = dir.join(format!("{name}.tmp"));
    fs::write(&tmp, bytes).map_err(|e| TransferError::io(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TransferError::io(&path, e)
    })?;
    Ok(path)
}

/// Summary of a fetch run.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub total: usize,
    /// Local paths of the files written, in request order.
    pub fetched: Vec<PathBuf>,
    pub errors: Vec<(String, TransferError)>,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Download `names` into `cache_dir`, continuing past per-file failures.
pub fn fetch_to_cache(
    client: &mut dyn TransferClient,
    cache_dir: &Path,
    names: &[String],
    progress: &dyn Progress,
) -> FetchSummary {
    let total = names.len();
    let mut summary = FetchSummary {
        total,
        ..Default::default()
    };

    for (i, name) in names.iter().enumerate() {
        progress.on_start(name, i, total);
        let result = client
            .download_file(name)
            .and_then(|bytes| {
                debug!(file = %name, bytes = bytes.len(), source = client.name(), "downloaded");
                write_atomic(cache_dir, name, &bytes)
            });

        match result {
            Ok(path) => {
                progress.on_complete(name, i, total, None);
                summary.fetched.push(path);
            }
            Err(e) => {
                progress.on_complete(name, i, total, Some(&e.to_string()));
                summary.errors.push((name.clone(), e));
            }
        }
    }

    progress.on_batch_complete(summary.fetched.len(), summary.errors.len(), total);
    summary
}
