//! Error types for the backup engine.

use crate::validator::ValidationReport;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation failed: {}", .0.errors.join("; "))]
    Validation(ValidationReport),

    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Import failed on table {table}: {reason}")]
    Import { table: String, reason: String },

    #[error("Unsupported restore strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl BackupError {
    /// Wrap an I/O error with the path it happened on.
    pub fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BackupError::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(e: serde_json::Error) -> Self {
        BackupError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
