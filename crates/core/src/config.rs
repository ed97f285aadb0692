//! Database configuration
//!
//! Configuration is loaded once and passed as an immutable value into
//! constructors; the only process-wide handles are the repository and index
//! themselves.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Notes reference under which commit metadata payloads are stored
pub const NOTES_REF: &str = "refs/notes/chrondb";

/// Top-level directory inside commit trees holding document files
pub const DATA_PREFIX: &str = "data";

fn default_branch() -> String {
    "main".to_string()
}

fn default_committer_name() -> String {
    "Chronicle".to_string()
}

fn default_committer_email() -> String {
    "chronicle@localhost".to_string()
}

/// Immutable database configuration.
///
/// `data_dir` holds the bare Git repository and the `wal/` directory;
/// `index_dir` holds the inverted-index files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory of the bare Git repository
    pub data_dir: PathBuf,

    /// Directory of the inverted-index files
    pub index_dir: PathBuf,

    /// Branch used when callers pass no branch
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Committer/author name stamped on every commit
    #[serde(default = "default_committer_name")]
    pub committer_name: String,

    /// Committer/author email stamped on every commit
    #[serde(default = "default_committer_email")]
    pub committer_email: String,

    /// Push the branch to `origin` after each commit when the remote exists.
    /// Push failures are logged, never fatal.
    #[serde(default)]
    pub push_on_commit: bool,
}

impl DatabaseConfig {
    /// Configuration with defaults for everything but the directories
    pub fn new(data_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        DatabaseConfig {
            data_dir: data_dir.into(),
            index_dir: index_dir.into(),
            default_branch: default_branch(),
            committer_name: default_committer_name(),
            committer_email: default_committer_email(),
            push_on_commit: false,
        }
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: DatabaseConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Override the default branch
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Override the committer identity
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer_name = name.into();
        self.committer_email = email.into();
        self
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.default_branch.is_empty() {
            return Err(Error::ConfigError("default branch is empty".to_string()));
        }
        if self.committer_name.is_empty() || self.committer_email.is_empty() {
            return Err(Error::ConfigError("committer identity is empty".to_string()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("data dir is empty".to_string()));
        }
        if self.index_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("index dir is empty".to_string()));
        }
        Ok(())
    }

    /// WAL directory, fixed relative to the data dir
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::new("/tmp/db", "/tmp/idx");
        assert_eq!(config.default_branch, "main");
        assert!(!config.push_on_commit);
        assert!(config.validate().is_ok());
        assert_eq!(config.wal_dir(), PathBuf::from("/tmp/db/wal"));
    }

    #[test]
    fn test_validate_rejects_empty_branch() {
        let config = DatabaseConfig::new("/tmp/db", "/tmp/idx").with_default_branch("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_committer() {
        let config = DatabaseConfig::new("/tmp/db", "/tmp/idx").with_committer("", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"data_dir": "/tmp/db", "index_dir": "/tmp/idx", "default_branch": "trunk"}"#,
        )
        .unwrap();
        let config = DatabaseConfig::from_json_file(&path).unwrap();
        assert_eq!(config.default_branch, "trunk");
        assert_eq!(config.committer_name, "Chronicle");
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{nope").unwrap();
        assert!(matches!(
            DatabaseConfig::from_json_file(&path),
            Err(Error::ConfigError(_))
        ));
    }
}
