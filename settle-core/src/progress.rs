//! Progress callbacks for multi-file operations (fetch and ingest).

use tracing::{info, warn};

/// Progress callback for multi-file operations.
///
/// Callbacks may arrive from worker threads and out of order.
pub trait Progress: Send + Sync {
    /// Called when work on a file starts.
    fn on_start(&self, file: &str, index: usize, total: usize);

    /// Called when a file is done. `error` is the rendered failure, if any.
    fn on_complete(&self, file: &str, index: usize, total: usize, error: Option<&str>);

    /// Called once after the last file.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports progress as tracing events.
pub struct LogProgress;

impl Progress for LogProgress {
    fn on_start(&self, file: &str, index: usize, total: usize) {
        info!(file, "[{}/{}] processing", index + 1, total);
    }

    fn on_complete(&self, file: &str, _index: usize, _total: usize, error: Option<&str>) {
        match error {
            None => info!(file, "done"),
            Some(e) => warn!(file, error = e, "failed"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!(succeeded, failed, total, "batch complete");
    }
}

/// Discards all progress.
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_start(&self, _file: &str, _index: usize, _total: usize) {}
    fn on_complete(&self, _file: &str, _index: usize, _total: usize, _error: Option<&str>) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}
