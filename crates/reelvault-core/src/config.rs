//! Library configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Configuration handed to `MediaLibrary::initialize`.
///
/// `ml_folder_path` is the root for the on-disk artifacts the catalog
/// owns (thumbnails, materialized playlists, subscription cache, lock
/// file); the database file itself lives at `db_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Filesystem path of the SQLite database file.
    pub db_path: PathBuf,
    /// Root directory for thumbnails/playlists/cache subdirectories.
    pub ml_folder_path: PathBuf,
    /// Acquire an exclusive lock file in `ml_folder_path`, preventing
    /// concurrent library instances over the same folder.
    #[serde(default)]
    pub lock_file: bool,
}

impl LibraryConfig {
    pub fn new(db_path: impl Into<PathBuf>, ml_folder_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ml_folder_path: ml_folder_path.into(),
            lock_file: false,
        }
    }

    /// Deserialize a config from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.ml_folder_path.join("thumbnails")
    }

    pub fn playlists_dir(&self) -> PathBuf {
        self.ml_folder_path.join("playlists")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.ml_folder_path.join("cache")
    }

    pub fn lock_file_path(&self) -> PathBuf {
        self.ml_folder_path.join(".ml.lock")
    }

    /// Validate paths, returning non-fatal warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.db_path == Path::new("") {
            warnings.push("db_path is empty".into());
        }
        if self.ml_folder_path == Path::new("") {
            warnings.push("ml_folder_path is empty".into());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths() {
        let cfg = LibraryConfig::new("/data/ml.db", "/data/ml");
        assert_eq!(cfg.thumbnails_dir(), PathBuf::from("/data/ml/thumbnails"));
        assert_eq!(cfg.playlists_dir(), PathBuf::from("/data/ml/playlists"));
        assert_eq!(cfg.cache_dir(), PathBuf::from("/data/ml/cache"));
        assert_eq!(cfg.lock_file_path(), PathBuf::from("/data/ml/.ml.lock"));
    }

    #[test]
    fn from_json() {
        let cfg = LibraryConfig::from_json(
            r#"{"db_path": "/tmp/a.db", "ml_folder_path": "/tmp/ml", "lock_file": true}"#,
        )
        .unwrap();
        assert!(cfg.lock_file);
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/a.db"));
    }

    #[test]
    fn empty_paths_warn() {
        let cfg = LibraryConfig::new("", "");
        assert_eq!(cfg.validate().len(), 2);
    }
}
