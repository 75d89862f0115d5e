//! Backup directories under a root: listing, cleanup of aborted runs and
//! retention.

use crate::executor::backup::{record_path, BACKUP_PREFIX};
use crate::fs::walker;
use crate::utils::errors::{BackupError, Result};
use crate::validator::IntegrityValidator;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub id: String,
    pub dir: PathBuf,
    pub record: PathBuf,
    /// Bytes on disk for the whole directory.
    pub size: u64,
    pub valid: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BackupCatalog {
    validator: IntegrityValidator,
}

impl BackupCatalog {
    pub fn new(validator: IntegrityValidator) -> Self {
        Self { validator }
    }

    /// Every `backup-*` directory under `root`, newest first. A missing root
    /// lists nothing.
    pub fn list(&self, root: &Path) -> Result<Vec<BackupEntry>> {
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dirent in fs::read_dir(root).map_err(|e| BackupError::storage(root, e))? {
            let dirent = dirent.map_err(|e| BackupError::storage(root, e))?;
            let dir = dirent.path();
            let name = dirent.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_prefix(BACKUP_PREFIX) else {
                continue;
            };
            if !dir.is_dir() {
                continue;
            }

            let record = record_path(&dir, id);
            entries.push(BackupEntry {
                id: id.to_string(),
                size: walker::total_size(&dir).map_err(|e| BackupError::storage(&dir, e))?,
                valid: self.validator.quick_check(&record),
                record,
                dir,
            });
        }

        entries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(entries)
    }

    /// Delete directories whose record is missing or undecodable.
    pub fn remove_incomplete(&self, root: &Path) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in self.list(root)?.into_iter().filter(|e| !e.valid) {
            remove_dir(&entry)?;
            removed.push(entry.id);
        }
        if !removed.is_empty() {
            info!("Removed {} incomplete backups", removed.len());
        }
        Ok(removed)
    }

    /// Keep the newest `keep` valid backups and delete the other valid ones.
    /// Incomplete directories are left to [`Self::remove_incomplete`].
    pub fn prune(&self, root: &Path, keep: usize) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in self.list(root)?.into_iter().filter(|e| e.valid).skip(keep) {
            remove_dir(&entry)?;
            removed.push(entry.id);
        }
        info!("Pruned {} backups, keeping {}", removed.len(), keep);
        Ok(removed)
    }
}

fn remove_dir(entry: &BackupEntry) -> Result<()> {
    warn!("Removing backup {}", entry.dir.display());
    fs::remove_dir_all(&entry.dir).map_err(|e| BackupError::storage(&entry.dir, e))
}
