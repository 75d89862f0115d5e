//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! no file at all) yields a complete configuration.

use crate::archive::Compression;
use crate::utils::errors::{BackupError, Result};
use crate::validator::ValidationLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub validation: ValidationLimits,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory holding one `backup-<id>/` directory per backup
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,

    /// Version recorded in each backup's metadata
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Device descriptor; the host name when unset
    #[serde(default)]
    pub device: Option<String>,

    /// Backups kept by `prune` when no count is given
    #[serde(default = "default_keep")]
    pub keep: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,

    #[serde(default = "default_signatures_dir")]
    pub signatures_dir: PathBuf,

    /// Archive photos at all
    #[serde(default = "default_true")]
    pub include_photos: bool,

    #[serde(default = "default_true")]
    pub include_thumbnails: bool,

    #[serde(default)]
    pub compression: Compression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_keep() -> usize {
    10
}

fn default_photos_dir() -> PathBuf {
    PathBuf::from("assets/photos")
}

fn default_signatures_dir() -> PathBuf {
    PathBuf::from("assets/signatures")
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backups_dir: default_backups_dir(),
            app_version: default_app_version(),
            device: None,
            keep: default_keep(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            photos_dir: default_photos_dir(),
            signatures_dir: default_signatures_dir(),
            include_photos: true,
            include_thumbnails: true,
            compression: Compression::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BackupError::storage(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Configured device descriptor, falling back to the host name.
    pub fn device_name(&self) -> String {
        self.backup
            .device
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| hostname::get().ok().and_then(|h| h.into_string().ok()))
            .unwrap_or_else(|| "unknown-device".to_string())
    }
}
