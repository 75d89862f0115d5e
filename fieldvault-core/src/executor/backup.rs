//! Backup creation pipeline.
//!
//! Steps, one per `next()`: export each table, export settings, archive
//! photos then signatures (one event per file), then seal and write the
//! record. All artifacts of one run share a directory and an id.

use crate::archive::{ArchiveProgress, AssetArchiver, CreateTask};
use crate::config::Config;
use crate::model::{
    AssetKind, AssetManifest, BackupMetadata, BackupRecord, DatabaseAggregate, SettingsSnapshot,
    Table,
};
use crate::progress::{self, format_bytes, format_duration, ProgressEvent};
use crate::serializer;
use crate::snapshot::{DatabaseSnapshotter, SettingsStore, TableStore};
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prefix of every backup directory and record file.
pub const BACKUP_PREFIX: &str = "backup-";

/// `YYYYMMDD-HHMMSS-<8 hex>`; sorts by creation time.
pub fn new_backup_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Directory of a backup under `backups_dir`.
pub fn backup_dir(backups_dir: &Path, id: &str) -> PathBuf {
    backups_dir.join(format!("{BACKUP_PREFIX}{id}"))
}

/// Record file inside a backup directory.
pub fn record_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{BACKUP_PREFIX}{id}.json"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub backup_id: String,
    /// Path of the record file.
    pub backup_path: PathBuf,
    pub total_size: u64,
    pub duration: Duration,
    pub tables_backed_up: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackupProgress {
    Started {
        backup_id: String,
    },
    TableExported {
        table: String,
        rows: usize,
        current: usize,
        total: usize,
    },
    SettingsExported {
        keys: usize,
    },
    FileArchived {
        kind: AssetKind,
        current: usize,
        total: usize,
        file_name: String,
    },
    AssetsArchived {
        kind: AssetKind,
        file_count: usize,
        archive_size: u64,
    },
    AssetsSkipped {
        kind: AssetKind,
        reason: String,
    },
    Completed(BackupSummary),
    Error {
        message: String,
    },
}

impl ProgressEvent for BackupProgress {
    fn failure(message: String) -> Self {
        BackupProgress::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, BackupProgress::Completed(_) | BackupProgress::Error { .. })
    }
}

pub struct BackupOrchestrator {
    tables: Arc<dyn TableStore>,
    settings: Arc<dyn SettingsStore>,
    config: Config,
}

impl BackupOrchestrator {
    pub fn new(tables: Arc<dyn TableStore>, settings: Arc<dyn SettingsStore>, config: Config) -> Self {
        Self {
            tables,
            settings,
            config,
        }
    }

    /// A backup run. Nothing happens until the task is pulled.
    pub fn create_backup(&self, cancel: CancellationToken) -> BackupTask {
        BackupTask {
            snapshotter: DatabaseSnapshotter::new(self.tables.clone()),
            settings: self.settings.clone(),
            archiver: AssetArchiver::new(self.config.assets.compression),
            config: self.config.clone(),
            cancel,
            step: Step::Start,
            run: None,
        }
    }
}

enum Step {
    Start,
    Table(usize),
    Settings,
    Assets(AssetKind, Option<CreateTask>),
    Write,
    Done,
}

/// State accumulated by one run.
struct Run {
    id: String,
    dir: PathBuf,
    created_at: DateTime<Utc>,
    started: Instant,
    database: DatabaseAggregate,
    settings: SettingsSnapshot,
    photo_manifest: AssetManifest,
    signature_manifest: AssetManifest,
    archive_bytes: u64,
}

pub struct BackupTask {
    snapshotter: DatabaseSnapshotter,
    settings: Arc<dyn SettingsStore>,
    archiver: AssetArchiver,
    config: Config,
    cancel: CancellationToken,
    step: Step,
    run: Option<Run>,
}

impl BackupTask {
    pub fn into_stream(self) -> impl Stream<Item = BackupProgress> + Send {
        progress::blocking_stream(self)
    }

    /// Drain the task to its summary.
    pub fn run(mut self) -> Result<BackupSummary> {
        while let Some(event) = self.advance() {
            if let BackupProgress::Completed(summary) = event? {
                return Ok(summary);
            }
        }
        Err(BackupError::Cancelled)
    }

    fn advance(&mut self) -> Option<Result<BackupProgress>> {
        if matches!(self.step, Step::Done) {
            return None;
        }
        let result = self.step();
        if let Err(e) = &result {
            self.step = Step::Done;
            error!("Backup failed: {}", e);
        }
        Some(result)
    }

    fn run_state(&mut self) -> Result<&mut Run> {
        self.run
            .as_mut()
            .ok_or_else(|| BackupError::Integrity("backup run not started".to_string()))
    }

    fn step(&mut self) -> Result<BackupProgress> {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        match std::mem::replace(&mut self.step, Step::Done) {
            Step::Start => self.start(),
            Step::Table(index) => self.export_table(index),
            Step::Settings => self.export_settings(),
            Step::Assets(kind, task) => self.archive_assets(kind, task),
            Step::Write => self.write_record(),
            Step::Done => Err(BackupError::Integrity("backup already finished".to_string())),
        }
    }

    fn start(&mut self) -> Result<BackupProgress> {
        let created_at = Utc::now();
        let id = new_backup_id(created_at);
        let dir = backup_dir(&self.config.backup.backups_dir, &id);
        fs::create_dir_all(&dir).map_err(|e| BackupError::storage(&dir, e))?;
        info!("Starting backup {} in {}", id, dir.display());

        self.run = Some(Run {
            id: id.clone(),
            dir,
            created_at,
            started: Instant::now(),
            database: DatabaseAggregate::default(),
            settings: SettingsSnapshot::default(),
            photo_manifest: AssetManifest::default(),
            signature_manifest: AssetManifest::default(),
            archive_bytes: 0,
        });
        self.step = Step::Table(0);
        Ok(BackupProgress::Started { backup_id: id })
    }

    fn export_table(&mut self, index: usize) -> Result<BackupProgress> {
        let table = Table::IMPORT_ORDER[index];
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| BackupError::Integrity("backup run not started".to_string()))?;
        let rows = self.snapshotter.export_table(table, &mut run.database)?;

        let total = Table::IMPORT_ORDER.len();
        self.step = if index + 1 < total {
            Step::Table(index + 1)
        } else {
            Step::Settings
        };
        Ok(BackupProgress::TableExported {
            table: table.name().to_string(),
            rows,
            current: index + 1,
            total,
        })
    }

    fn export_settings(&mut self) -> Result<BackupProgress> {
        let values = self.settings.export_all()?;
        let keys = values.len();
        let run = self.run_state()?;
        run.settings = SettingsSnapshot {
            values,
            created_at: run.created_at,
        };
        debug!("Exported {} settings", keys);

        self.step = self.first_asset_step();
        Ok(BackupProgress::SettingsExported { keys })
    }

    fn first_asset_step(&self) -> Step {
        if self.config.assets.include_photos {
            Step::Assets(AssetKind::Photo, None)
        } else {
            Step::Assets(AssetKind::Signature, None)
        }
    }

    fn source_root(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Photo => &self.config.assets.photos_dir,
            AssetKind::Signature => &self.config.assets.signatures_dir,
        }
    }

    fn after_assets(kind: AssetKind) -> Step {
        match kind {
            AssetKind::Photo => Step::Assets(AssetKind::Signature, None),
            AssetKind::Signature => Step::Write,
        }
    }

    fn archive_assets(&mut self, kind: AssetKind, task: Option<CreateTask>) -> Result<BackupProgress> {
        let mut task = match task {
            Some(task) => task,
            None => {
                let root = self.source_root(kind).to_path_buf();
                if !root.is_dir() {
                    warn!("No {} directory at {}, skipping", kind.label(), root.display());
                    self.step = Self::after_assets(kind);
                    return Ok(BackupProgress::AssetsSkipped {
                        kind,
                        reason: format!("{} does not exist", root.display()),
                    });
                }
                let run = self.run_state()?;
                let output = run.dir.join(kind.archive_name());
                self.archiver.create_archive(
                    &root,
                    &output,
                    self.config.assets.include_thumbnails,
                    self.cancel.clone(),
                )
            }
        };

        match task.advance().transpose()? {
            Some(ArchiveProgress::FileArchived {
                current,
                total,
                file_name,
                ..
            }) => {
                self.step = Step::Assets(kind, Some(task));
                Ok(BackupProgress::FileArchived {
                    kind,
                    current,
                    total,
                    file_name,
                })
            }
            Some(ArchiveProgress::Completed {
                path,
                file_count,
                manifest,
            }) => {
                let archive_size = fs::metadata(&path)
                    .map_err(|e| BackupError::storage(&path, e))?
                    .len();
                let run = self.run_state()?;
                run.archive_bytes += archive_size;
                match kind {
                    AssetKind::Photo => run.photo_manifest = manifest,
                    AssetKind::Signature => run.signature_manifest = manifest,
                }
                self.step = Self::after_assets(kind);
                Ok(BackupProgress::AssetsArchived {
                    kind,
                    file_count,
                    archive_size,
                })
            }
            Some(ArchiveProgress::Error { message }) => Err(BackupError::Integrity(message)),
            None => Err(BackupError::Cancelled),
        }
    }

    fn write_record(&mut self) -> Result<BackupProgress> {
        let metadata_base = BackupMetadata {
            app_version: self.config.backup.app_version.clone(),
            schema_version: self.snapshotter.schema_version()?,
            device: self.config.device_name(),
            ..Default::default()
        };
        let run = self
            .run
            .take()
            .ok_or_else(|| BackupError::Integrity("backup run not started".to_string()))?;

        let mut record = BackupRecord {
            metadata: BackupMetadata {
                id: run.id.clone(),
                created_at: run.created_at,
                ..metadata_base
            },
            database: run.database,
            settings: run.settings,
            photo_manifest: run.photo_manifest,
            signature_manifest: run.signature_manifest,
        };

        let canonical_len = serializer::canonical_bytes(&record)?.len() as u64;
        serializer::seal(&mut record)?;
        record.metadata.total_size = canonical_len + run.archive_bytes;

        let path = record_path(&run.dir, &run.id);
        serializer::write_file(&path, &record)?;

        let summary = BackupSummary {
            backup_id: run.id,
            backup_path: path,
            total_size: record.metadata.total_size,
            duration: run.started.elapsed(),
            tables_backed_up: Table::IMPORT_ORDER.len(),
        };
        info!(
            "Backup {} complete: {} rows, {} in {}",
            summary.backup_id,
            record.database.total_rows(),
            format_bytes(summary.total_size),
            format_duration(summary.duration)
        );
        Ok(BackupProgress::Completed(summary))
    }
}

impl Iterator for BackupTask {
    type Item = BackupProgress;

    fn next(&mut self) -> Option<BackupProgress> {
        self.advance().map(|result| {
            result.unwrap_or_else(|e| BackupProgress::Error {
                message: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MemorySettings, MemoryStore};
    use crate::testutil::{sample_aggregate, sample_record, write_sample_photos};
    use crate::validator::IntegrityValidator;
    use futures_util::StreamExt;
    use tempfile::TempDir;

    fn orchestrator(root: &Path) -> BackupOrchestrator {
        let mut config = Config::default();
        config.backup.backups_dir = root.join("backups");
        config.backup.device = Some("tablet-07".into());
        config.assets.photos_dir = root.join("photos");
        config.assets.signatures_dir = root.join("signatures");

        BackupOrchestrator::new(
            Arc::new(MemoryStore::with_data(4, sample_aggregate())),
            Arc::new(MemorySettings::with_values(sample_record().settings.values)),
            config,
        )
    }

    #[test]
    fn test_backup_id_format() {
        let id = new_backup_id(crate::testutil::ts(2, 8));
        assert_eq!(id.len(), "20240502-083000-".len() + 8);
        assert!(id.starts_with("20240502-083000-"));
        assert!(id[16..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_full_backup_produces_valid_record() {
        let dir = TempDir::new().unwrap();
        write_sample_photos(&dir.path().join("photos"));

        let events: Vec<BackupProgress> = orchestrator(dir.path())
            .create_backup(CancellationToken::new())
            .collect();

        let tables = events
            .iter()
            .filter(|e| matches!(e, BackupProgress::TableExported { .. }))
            .count();
        let photos = events
            .iter()
            .filter(|e| matches!(e, BackupProgress::FileArchived { kind: AssetKind::Photo, .. }))
            .count();
        assert_eq!(tables, 9);
        assert_eq!(photos, 5);
        assert!(events
            .iter()
            .any(|e| matches!(e, BackupProgress::AssetsSkipped { kind: AssetKind::Signature, .. })));

        let Some(BackupProgress::Completed(summary)) = events.last() else {
            panic!("unexpected terminal event {:?}", events.last());
        };
        assert_eq!(summary.tables_backed_up, 9);
        let backup_dir = summary.backup_path.parent().unwrap();
        assert_eq!(
            backup_dir.file_name().unwrap().to_string_lossy(),
            format!("backup-{}", summary.backup_id)
        );
        assert!(backup_dir.join("photos.zip").exists());
        assert!(!backup_dir.join("signatures.zip").exists());

        let (report, record) = IntegrityValidator::default().full_validate_record(&summary.backup_path);
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        let record = record.unwrap();
        assert_eq!(record.metadata.id, summary.backup_id);
        assert_eq!(record.metadata.device, "tablet-07");
        assert_eq!(record.metadata.schema_version, 4);
        assert_eq!(record.database, sample_aggregate());
        assert_eq!(record.photo_manifest.total_count, 5);
        assert!(record.signature_manifest.is_empty());

        let canonical = serializer::canonical_bytes(&record).unwrap().len() as u64;
        let archive = fs::metadata(backup_dir.join("photos.zip")).unwrap().len();
        assert_eq!(summary.total_size, canonical + archive);
        assert_eq!(record.metadata.total_size, summary.total_size);
    }

    #[test]
    fn test_photos_can_be_excluded() {
        let dir = TempDir::new().unwrap();
        write_sample_photos(&dir.path().join("photos"));
        let mut orchestrator = orchestrator(dir.path());
        orchestrator.config.assets.include_photos = false;

        let summary = orchestrator.create_backup(CancellationToken::new()).run().unwrap();
        let record = serializer::read_file(&summary.backup_path).unwrap();
        assert!(record.photo_manifest.is_empty());
        assert!(!summary.backup_path.with_file_name("photos.zip").exists());
    }

    #[test]
    fn test_cancel_stops_with_error() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut task = orchestrator(dir.path()).create_backup(cancel.clone());

        assert!(matches!(task.next(), Some(BackupProgress::Started { .. })));
        assert!(matches!(task.next(), Some(BackupProgress::TableExported { current: 1, .. })));
        cancel.cancel();
        assert!(matches!(task.next(), Some(BackupProgress::Error { .. })));
        assert!(task.next().is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_with_completed() {
        let dir = TempDir::new().unwrap();
        let events: Vec<BackupProgress> = orchestrator(dir.path())
            .create_backup(CancellationToken::new())
            .into_stream()
            .collect()
            .await;
        assert!(matches!(events.last(), Some(BackupProgress::Completed(_))));
    }
}
