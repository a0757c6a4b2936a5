//! Custom error types for the backup tool.

use crate::destination::Platform;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Traversal error at {path}: {reason}")]
    Traversal { path: PathBuf, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize archive {artifact}: {source}")]
    Finalize {
        artifact: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote upload to {platform} failed: {reason}")]
    Remote { platform: Platform, reason: String },

    #[error("Backup task failed: {0}")]
    Task(String),

    #[error("{failed} of {total} destinations failed, first failure at {target}: {source}")]
    DestinationsFailed {
        target: String,
        failed: usize,
        total: usize,
        #[source]
        source: Box<BackupError>,
    },
}

impl BackupError {
    /// Build a mapper that attaches `path` to an I/O error, for use with `map_err`.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> BackupError {
        let path = path.as_ref().to_path_buf();
        move |source| BackupError::Io { path, source }
    }
}

impl From<walkdir::Error> for BackupError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        match err.into_io_error() {
            Some(source) => BackupError::Io { path, source },
            // Only symlink loops end up here.
            None => BackupError::Traversal {
                path,
                reason: "filesystem loop detected".to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
