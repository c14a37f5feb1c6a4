//! A directory on disk posing as a transfer source.
//!
//! Used to ingest from the download cache and in tests.

use std::fs;
use std::path::{Path, PathBuf};

use super::{TransferClient, TransferError};

pub struct LocalDirClient {
    dir: PathBuf,
    label: String,
}

impl LocalDirClient {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let label = dir.display().to_string();
        Self { dir, label }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TransferClient for LocalDirClient {
    fn name(&self) -> &str {
        &self.label
    }

    /// Regular files only, sorted by name. Partial `.tmp` downloads are skipped.
    fn list_remote_files(&mut self) -> Result<Vec<String>, TransferError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| TransferError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TransferError::io(&self.dir, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| TransferError::io(entry.path(), e))?
                .is_file();
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(".tmp") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn download_file(&mut self, name: &str) -> Result<Vec<u8>, TransferError> {
        let path = self.dir.join(name);
        fs::read(&path).map_err(|e| TransferError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_files_sorted_without_temporaries_or_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.s.xml"), b"b").unwrap();
        fs::write(dir.path().join("a.s.xml"), b"a").unwrap();
        fs::write(dir.path().join("c.s.xml.tmp"), b"partial").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut client = LocalDirClient::new(dir.path());
        assert_eq!(client.list_remote_files().unwrap(), vec!["a.s.xml", "b.s.xml"]);
        assert_eq!(client.download_file("b.s.xml").unwrap(), b"b");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = LocalDirClient::new(dir.path());
        assert!(matches!(
            client.download_file("nope.s.xml"),
            Err(TransferError::Io { .. })
        ));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let mut client = LocalDirClient::new("/nonexistent/settle/cache");
        assert!(client.list_remote_files().is_err());
    }
}
