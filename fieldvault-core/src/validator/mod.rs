//! Backup record validation: a cheap decodability check, and a full pass
//! covering structure, metadata, referential integrity, manifests, checksum
//! and size advisories.

pub mod referential;
mod report;

pub use report::ValidationReport;

use crate::model::{AssetManifest, BackupRecord, REQUIRED_FIELDS};
use crate::serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Thresholds above which validation emits advisory warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationLimits {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,
    /// Declared `totalSize` beyond which the backup is unusually large.
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
}

fn default_max_file_bytes() -> u64 {
    500 * MIB
}

fn default_max_rows() -> usize {
    50_000
}

fn default_max_photos() -> usize {
    1_000
}

fn default_max_total_size() -> u64 {
    2 * 1024 * MIB
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_rows: default_max_rows(),
            max_photos: default_max_photos(),
            max_total_size: default_max_total_size(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityValidator {
    limits: ValidationLimits,
}

impl IntegrityValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Exists, non-empty, and decodes as a record. Never errors.
    pub fn quick_check(&self, path: &Path) -> bool {
        let non_empty = fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        non_empty && serializer::read_file(path).is_ok()
    }

    pub fn full_validate(&self, path: &Path) -> ValidationReport {
        self.full_validate_record(path).0
    }

    /// Full validation that also hands back the decoded record when the file
    /// could be decoded, valid or not.
    pub fn full_validate_record(&self, path: &Path) -> (ValidationReport, Option<BackupRecord>) {
        let mut report = ValidationReport::default();

        let file_size = match fs::metadata(path) {
            Ok(meta) if !meta.is_file() => {
                report.error(format!("{} is not a file", path.display()));
                return (report, None);
            }
            Ok(meta) if meta.len() == 0 => {
                report.error(format!("{} is empty", path.display()));
                return (report, None);
            }
            Ok(meta) => meta.len(),
            Err(e) => {
                report.error(format!("cannot access {}: {e}", path.display()));
                return (report, None);
            }
        };

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report.error(format!("cannot read {}: {e}", path.display()));
                return (report, None);
            }
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                report.error(format!("content is not valid JSON: {e}"));
                return (report, None);
            }
        };

        let Some(object) = value.as_object() else {
            report.error("top-level value is not an object");
            return (report, None);
        };
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            for field in missing {
                report.error(format!("missing required field '{field}'"));
            }
            return (report, None);
        }

        let record = match serializer::decode_value(value) {
            Ok(record) => record,
            Err(e) => {
                report.error(e.to_string());
                return (report, None);
            }
        };

        self.check_record(&record, file_size, &mut report);

        if report.is_valid() {
            info!(
                "Validated {}: {} warnings",
                path.display(),
                report.warnings.len()
            );
        } else {
            warn!(
                "Validation of {} failed: {}",
                path.display(),
                report.errors.join("; ")
            );
        }
        (report, Some(record))
    }

    /// Every semantic check on an already-decoded record. `file_size` is the
    /// encoded size on disk, used for the size advisory.
    pub fn check_record(&self, record: &BackupRecord, file_size: u64, report: &mut ValidationReport) {
        let meta = &record.metadata;
        if meta.id.trim().is_empty() {
            report.error("metadata.id is blank");
        }
        if meta.app_version.trim().is_empty() {
            report.warning("metadata.appVersion is blank");
        }
        if meta.schema_version <= 0 {
            report.warning(format!(
                "metadata.schemaVersion is not positive ({})",
                meta.schema_version
            ));
        }
        if meta.total_size == 0 {
            report.warning("metadata.totalSize is zero");
        } else if meta.total_size > self.limits.max_total_size {
            report.warning(format!(
                "metadata.totalSize of {} bytes exceeds {} bytes",
                meta.total_size, self.limits.max_total_size
            ));
        }
        if meta.device.trim().is_empty() {
            report.warning("metadata.device is blank");
        }

        referential::check(&record.database, report);

        manifest_consistency("photoManifest", &record.photo_manifest, report);
        manifest_consistency("signatureManifest", &record.signature_manifest, report);

        if meta.checksum.is_empty() {
            report.warning("checksum is empty; content cannot be verified");
        } else if !serializer::verify_checksum(record) {
            report.error("checksum mismatch: possible corruption");
        }

        if file_size > self.limits.max_file_bytes {
            report.warning(format!(
                "record file is {} bytes, above the {} byte advisory limit",
                file_size, self.limits.max_file_bytes
            ));
        }
        let rows = record.database.total_rows();
        if rows > self.limits.max_rows {
            report.warning(format!(
                "{rows} database rows, above the {} row advisory limit",
                self.limits.max_rows
            ));
        }
        let photos = record.photo_manifest.records.len();
        if photos > self.limits.max_photos {
            report.warning(format!(
                "{photos} photos, above the {} photo advisory limit",
                self.limits.max_photos
            ));
        }
    }

    /// Full validation of each path, keyed by path.
    pub fn batch_validate<I, P>(&self, paths: I) -> BTreeMap<PathBuf, ValidationReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                debug!("Validating {}", path.display());
                let report = self.full_validate(&path);
                (path, report)
            })
            .collect()
    }
}

/// Declared totals and digest formats; file contents are not touched.
fn manifest_consistency(label: &str, manifest: &AssetManifest, report: &mut ValidationReport) {
    if !manifest.count_matches() {
        report.warning(format!(
            "{label}: totalCount is {} but {} records are listed",
            manifest.total_count,
            manifest.records.len()
        ));
    }
    for record in manifest.records.iter().filter(|r| !r.has_valid_digest()) {
        report.warning(format!(
            "{label}: malformed digest for {}",
            record.relative_path
        ));
    }
}
