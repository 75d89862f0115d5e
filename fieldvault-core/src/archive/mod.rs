//! Zip archives of binary assets with per-file SHA-256 manifests.

mod create;
mod extract;

pub use create::{ArchiveProgress, CreateTask};
pub use extract::{ExtractProgress, ExtractTask};

use crate::digest::hash_file;
use crate::fs::walker::{walk_assets, AssetFile, WalkOptions, THUMBNAIL_DIR};
use crate::model::{AssetManifest, AssetRecord};
use crate::utils::errors::{BackupError, Result};
use crate::validator::ValidationReport;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zip::CompressionMethod;

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflate,
    Zstd,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Zstd => CompressionMethod::Zstd,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetArchiver {
    compression: Compression,
}

impl AssetArchiver {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Archive every file under `source_root` into `output_path`. Nothing is
    /// read until the task is pulled.
    pub fn create_archive(
        &self,
        source_root: &Path,
        output_path: &Path,
        include_thumbnails: bool,
        cancel: CancellationToken,
    ) -> CreateTask {
        CreateTask::new(
            source_root.to_path_buf(),
            output_path.to_path_buf(),
            include_thumbnails,
            self.compression,
            cancel,
        )
    }

    pub fn extract_archive(
        &self,
        archive_path: &Path,
        output_dir: &Path,
        cancel: CancellationToken,
    ) -> ExtractTask {
        ExtractTask::new(archive_path.to_path_buf(), output_dir.to_path_buf(), cancel)
    }

    /// Manifest of the files under `source_root` without writing an archive.
    pub fn build_manifest(&self, source_root: &Path, include_thumbnails: bool) -> Result<AssetManifest> {
        let files = list_assets(source_root, include_thumbnails)?;
        let thumbnails = thumbnail_set(&files);
        let mut records = Vec::with_capacity(files.len());
        for file in &files {
            let (size, sha256) =
                hash_file(&file.path).map_err(|e| BackupError::storage(&file.path, e))?;
            records.push(asset_record(file, size, sha256, &thumbnails));
        }
        Ok(AssetManifest::from_records(records, include_thumbnails))
    }

    /// Re-hash each manifest entry found under `root`.
    pub fn validate_integrity(&self, manifest: &AssetManifest, root: &Path) -> ValidationReport {
        let mut report = ValidationReport::default();
        let single = manifest.records.len() == 1;

        if !manifest.count_matches() {
            report.warning(format!(
                "manifest declares {} files but lists {}",
                manifest.total_count,
                manifest.records.len()
            ));
        }

        for record in &manifest.records {
            let Some(path) = resolve(root, &record.relative_path) else {
                report.error(format!("unsafe path {}", record.relative_path));
                continue;
            };
            let (size, digest) = match hash_file(&path) {
                Ok(found) => found,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    report.error(format!("missing file {}", record.relative_path));
                    continue;
                }
                Err(e) => {
                    report.error(format!("cannot read {}: {e}", record.relative_path));
                    continue;
                }
            };

            if size != record.size {
                report.error(format!(
                    "size mismatch for {}: expected {}, found {}",
                    record.relative_path, record.size, size
                ));
                continue;
            }

            if !record.has_valid_digest() {
                let message = format!("malformed digest for {}", record.relative_path);
                if single {
                    report.error(message);
                } else {
                    report.warning(message);
                }
                continue;
            }

            if !digest.eq_ignore_ascii_case(&record.sha256) {
                report.error(format!("digest mismatch for {}", record.relative_path));
            } else {
                debug!("Verified {}", record.relative_path);
            }
        }

        report
    }
}

fn list_assets(root: &Path, include_thumbnails: bool) -> Result<Vec<AssetFile>> {
    let options = WalkOptions::default().thumbnails(include_thumbnails);
    walk_assets(root, &options).map_err(|e| BackupError::storage(root, e))
}

/// Relative paths of the thumbnails present in `files`.
fn thumbnail_set(files: &[AssetFile]) -> HashSet<String> {
    files
        .iter()
        .filter(|f| f.is_thumbnail)
        .map(|f| f.relative_path.clone())
        .collect()
}

fn asset_record(file: &AssetFile, size: u64, sha256: String, thumbnails: &HashSet<String>) -> AssetRecord {
    let has_thumbnail = !file.is_thumbnail && {
        let dir = file
            .relative_path
            .strip_suffix(file.file_name.as_str())
            .unwrap_or("");
        thumbnails.contains(&format!("{dir}{THUMBNAIL_DIR}/{}", file.file_name))
    };
    AssetRecord {
        record_id: file.record_id.clone(),
        file_name: file.file_name.clone(),
        relative_path: file.relative_path.clone(),
        size,
        sha256,
        has_thumbnail,
    }
}

/// Join a `/`-separated manifest path onto `root`. `None` unless every
/// segment is a plain file or directory name.
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for part in relative.split('/').filter(|part| !part.is_empty()) {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !part.contains('\\') => path.push(name),
            _ => return None,
        }
    }
    Some(path)
}
