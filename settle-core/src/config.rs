//! Ingest configuration, loaded from TOML.
//!
//! Every key is optional; a missing key takes its default. The CLI layers
//! its flags on top of whatever the file provides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::TableLayout;
use crate::transfer::SETTLE_SUFFIX;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// FTP endpoint holding the settlement files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    /// Directory to `cwd` into after login.
    pub path: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "ftp.cmegroup.com".into(),
            port: 21,
            path: "settle".into(),
            user: "anonymous".into(),
            password: "anonymous".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `settle_core=debug`.
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub storage_uri: String,
    /// Local directory downloaded files are cached in.
    pub cache_dir: PathBuf,
    /// Filename suffix of settlement files.
    pub suffix: String,
    pub layout: TableLayout,
    /// Parse threads for batch ingest; 0 uses every core.
    pub workers: usize,
    pub remote: RemoteConfig,
    pub log: LogConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            storage_uri: "sqlite://cme.sqlite".into(),
            cache_dir: PathBuf::from("settle"),
            suffix: SETTLE_SUFFIX.into(),
            layout: TableLayout::Routed,
            workers: 0,
            remote: RemoteConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_uri is empty".into()));
        }
        if self.suffix.is_empty() {
            return Err(ConfigError::Invalid("suffix is empty".into()));
        }
        if self.remote.port == 0 {
            return Err(ConfigError::Invalid("remote.port must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = IngestConfig::from_toml("").unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.storage_uri, "sqlite://cme.sqlite");
        assert_eq!(config.remote.host, "ftp.cmegroup.com");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = IngestConfig::from_toml(
            r#"
            storage_uri = "parquet://out"
            layout = "single"
            workers = 4

            [remote]
            host = "localhost"
            port = 2121
            "#,
        )
        .unwrap();
        assert_eq!(config.storage_uri, "parquet://out");
        assert_eq!(config.layout, TableLayout::Single);
        assert_eq!(config.workers, 4);
        assert_eq!(config.remote.host, "localhost");
        assert_eq!(config.remote.port, 2121);
        assert_eq!(config.remote.path, "settle");
        assert_eq!(config.suffix, "s.xml");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for doc in [
            "storage_uri = \"\"",
            "suffix = \"\"",
            "[remote]\nport = 0",
        ] {
            assert!(
                matches!(IngestConfig::from_toml(doc), Err(ConfigError::Invalid(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn unknown_layout_is_a_parse_error() {
        assert!(matches!(
            IngestConfig::from_toml("layout = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IngestConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
