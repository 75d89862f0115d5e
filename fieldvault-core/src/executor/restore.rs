//! Restore pipeline: validate, import, extract assets.
//!
//! The database import runs as one transaction inside a single step; its
//! per-table events are queued and delivered once it commits. Extraction is
//! not rolled back if a later step fails.

use crate::archive::{AssetArchiver, ExtractProgress, ExtractTask};
use crate::config::Config;
use crate::model::{AssetKind, BackupRecord};
use crate::progress::{self, ProgressEvent};
use crate::snapshot::{DatabaseSnapshotter, RestoreStrategy, SettingsStore, TableStore};
use crate::utils::errors::{BackupError, Result};
use crate::validator::IntegrityValidator;
use futures_util::Stream;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Idle,
    Validating,
    Importing,
    ExtractingAssets,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestoreProgress {
    Validating {
        path: PathBuf,
    },
    Validated {
        warnings: usize,
    },
    TableImported {
        table: String,
        processed: usize,
        total: usize,
    },
    SettingsRestored {
        keys: usize,
    },
    FileExtracted {
        kind: AssetKind,
        current: usize,
        total: usize,
        file_name: String,
    },
    AssetsVerified {
        kind: AssetKind,
        files: usize,
    },
    Completed {
        restored_records: usize,
        warnings: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl RestoreProgress {
    /// Phase the pipeline is in once this event is delivered.
    pub fn phase(&self) -> RestorePhase {
        match self {
            RestoreProgress::Validating { .. } | RestoreProgress::Validated { .. } => {
                RestorePhase::Validating
            }
            RestoreProgress::TableImported { .. } | RestoreProgress::SettingsRestored { .. } => {
                RestorePhase::Importing
            }
            RestoreProgress::FileExtracted { .. } | RestoreProgress::AssetsVerified { .. } => {
                RestorePhase::ExtractingAssets
            }
            RestoreProgress::Completed { .. } => RestorePhase::Completed,
            RestoreProgress::Error { .. } => RestorePhase::Error,
        }
    }
}

impl ProgressEvent for RestoreProgress {
    fn failure(message: String) -> Self {
        RestoreProgress::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, RestoreProgress::Completed { .. } | RestoreProgress::Error { .. })
    }
}

pub struct RestoreCoordinator {
    tables: Arc<dyn TableStore>,
    settings: Arc<dyn SettingsStore>,
    config: Config,
}

impl RestoreCoordinator {
    pub fn new(tables: Arc<dyn TableStore>, settings: Arc<dyn SettingsStore>, config: Config) -> Self {
        Self {
            tables,
            settings,
            config,
        }
    }

    /// Restore from the record at `backup_path`. Archives are looked up next
    /// to the record and extracted into the configured asset directories.
    pub fn restore(&self, backup_path: &Path, strategy: RestoreStrategy, cancel: CancellationToken) -> RestoreTask {
        RestoreTask {
            backup_path: backup_path.to_path_buf(),
            strategy,
            snapshotter: DatabaseSnapshotter::new(self.tables.clone()),
            settings: self.settings.clone(),
            validator: IntegrityValidator::new(self.config.validation.clone()),
            archiver: AssetArchiver::new(self.config.assets.compression),
            photos_dir: self.config.assets.photos_dir.clone(),
            signatures_dir: self.config.assets.signatures_dir.clone(),
            cancel,
            phase: RestorePhase::Idle,
            step: Step::Announce,
            queued: VecDeque::new(),
            record: None,
            restored_records: 0,
            warnings: Vec::new(),
        }
    }
}

enum Step {
    Announce,
    Validate,
    Import,
    Extract(AssetKind, Option<ExtractTask>),
    Verify(AssetKind),
    Finish,
    Done,
}

pub struct RestoreTask {
    backup_path: PathBuf,
    strategy: RestoreStrategy,
    snapshotter: DatabaseSnapshotter,
    settings: Arc<dyn SettingsStore>,
    validator: IntegrityValidator,
    archiver: AssetArchiver,
    photos_dir: PathBuf,
    signatures_dir: PathBuf,
    cancel: CancellationToken,
    phase: RestorePhase,
    step: Step,
    queued: VecDeque<RestoreProgress>,
    record: Option<BackupRecord>,
    restored_records: usize,
    warnings: Vec<String>,
}

impl RestoreTask {
    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    pub fn into_stream(self) -> impl Stream<Item = RestoreProgress> + Send {
        progress::blocking_stream(self)
    }

    /// Drain the task, returning `(restored_records, warnings)`.
    pub fn run(mut self) -> Result<(usize, Vec<String>)> {
        while let Some(event) = self.advance() {
            if let RestoreProgress::Completed {
                restored_records,
                warnings,
            } = event?
            {
                return Ok((restored_records, warnings));
            }
        }
        Err(BackupError::Cancelled)
    }

    fn advance(&mut self) -> Option<Result<RestoreProgress>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                self.phase = event.phase();
                return Some(Ok(event));
            }
            if matches!(self.step, Step::Done) {
                return None;
            }
            match self.step() {
                Ok(Some(event)) => {
                    self.phase = event.phase();
                    return Some(Ok(event));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.step = Step::Done;
                    self.phase = RestorePhase::Error;
                    error!("Restore failed: {}", e);
                    return Some(Err(e));
                }
            }
        }
    }

    fn record(&self) -> Result<&BackupRecord> {
        self.record
            .as_ref()
            .ok_or_else(|| BackupError::Integrity("backup record not loaded".to_string()))
    }

    fn asset_dir(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Photo => &self.photos_dir,
            AssetKind::Signature => &self.signatures_dir,
        }
    }

    fn step(&mut self) -> Result<Option<RestoreProgress>> {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        match std::mem::replace(&mut self.step, Step::Done) {
            Step::Announce => {
                self.strategy.ensure_supported()?;
                self.step = Step::Validate;
                info!("Restoring from {} ({})", self.backup_path.display(), self.strategy);
                Ok(Some(RestoreProgress::Validating {
                    path: self.backup_path.clone(),
                }))
            }
            Step::Validate => self.validate().map(Some),
            Step::Import => self.import().map(|_| None),
            Step::Extract(kind, task) => self.extract(kind, task),
            Step::Verify(kind) => self.verify(kind).map(Some),
            Step::Finish => {
                info!(
                    "Restore complete: {} rows, {} warnings",
                    self.restored_records,
                    self.warnings.len()
                );
                Ok(Some(RestoreProgress::Completed {
                    restored_records: self.restored_records,
                    warnings: std::mem::take(&mut self.warnings),
                }))
            }
            Step::Done => Ok(None),
        }
    }

    fn validate(&mut self) -> Result<RestoreProgress> {
        let (report, record) = self.validator.full_validate_record(&self.backup_path);
        if !report.is_valid() {
            return Err(BackupError::Validation(report));
        }
        let record = record.ok_or_else(|| BackupError::Integrity("record could not be decoded".to_string()))?;
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        self.warnings.extend(report.warnings);
        self.record = Some(record);
        self.step = Step::Import;
        Ok(RestoreProgress::Validated {
            warnings: self.warnings.len(),
        })
    }

    /// One transaction for all tables, then settings.
    fn import(&mut self) -> Result<()> {
        let record = self.record()?;
        let cancel = self.cancel.clone();
        let mut events = Vec::new();
        let restored = self.snapshotter.import_with_progress(&record.database, self.strategy, |p| {
            if cancel.is_cancelled() {
                return Err(BackupError::Cancelled);
            }
            events.push(RestoreProgress::TableImported {
                table: p.table.name().to_string(),
                processed: p.processed,
                total: p.total,
            });
            Ok(())
        })?;

        let values: BTreeMap<String, String> = record
            .settings
            .values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let skipped = record.settings.values.len() - values.len();
        let keys = self.settings.merge(&values)?;
        if skipped > 0 {
            debug!("Skipped {} empty settings", skipped);
        }

        self.restored_records = restored;
        self.queued.extend(events);
        self.queued.push_back(RestoreProgress::SettingsRestored { keys });
        self.step = self.next_asset_step(None);
        Ok(())
    }

    /// First asset kind after `after` whose manifest lists files.
    fn next_asset_step(&self, after: Option<AssetKind>) -> Step {
        let kinds: &[AssetKind] = match after {
            None => &[AssetKind::Photo, AssetKind::Signature],
            Some(AssetKind::Photo) => &[AssetKind::Signature],
            Some(AssetKind::Signature) => &[],
        };
        let pending = self
            .record
            .as_ref()
            .and_then(|r| kinds.iter().copied().find(|k| !r.manifest(*k).is_empty()));
        match pending {
            Some(kind) => Step::Extract(kind, None),
            None => Step::Finish,
        }
    }

    fn extract(&mut self, kind: AssetKind, task: Option<ExtractTask>) -> Result<Option<RestoreProgress>> {
        let mut task = match task {
            Some(task) => task,
            None => {
                let archive = self
                    .backup_path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(kind.archive_name());
                if !archive.is_file() {
                    return Err(BackupError::Integrity(format!(
                        "{} manifest lists {} files but {} is missing",
                        kind.label(),
                        self.record()?.manifest(kind).records.len(),
                        archive.display()
                    )));
                }
                self.archiver
                    .extract_archive(&archive, self.asset_dir(kind), self.cancel.clone())
            }
        };

        match task.advance().transpose()? {
            Some(ExtractProgress::FileExtracted {
                current,
                total,
                file_name,
                ..
            }) => {
                self.step = Step::Extract(kind, Some(task));
                Ok(Some(RestoreProgress::FileExtracted {
                    kind,
                    current,
                    total,
                    file_name,
                }))
            }
            Some(ExtractProgress::Completed { extracted, .. }) => {
                debug!("Extracted {} {} files", extracted, kind.label());
                self.step = Step::Verify(kind);
                Ok(None)
            }
            Some(ExtractProgress::Error { message }) => Err(BackupError::Integrity(message)),
            None => Err(BackupError::Cancelled),
        }
    }

    fn verify(&mut self, kind: AssetKind) -> Result<RestoreProgress> {
        let manifest = self.record()?.manifest(kind);
        let report = self.archiver.validate_integrity(manifest, self.asset_dir(kind));
        let files = manifest.records.len();
        if !report.is_valid() {
            return Err(BackupError::Validation(report));
        }
        self.warnings
            .extend(report.warnings.into_iter().map(|w| format!("{}: {w}", kind.label())));
        self.step = self.next_asset_step(Some(kind));
        Ok(RestoreProgress::AssetsVerified { kind, files })
    }
}

impl Iterator for RestoreTask {
    type Item = RestoreProgress;

    fn next(&mut self) -> Option<RestoreProgress> {
        self.advance().map(|result| {
            result.unwrap_or_else(|e| RestoreProgress::Error {
                message: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::backup::BackupOrchestrator;
    use crate::model::{DatabaseAggregate, Organization, Table};
    use crate::snapshot::{MemorySettings, MemoryStore};
    use crate::testutil::{photo_bytes, sample_aggregate, sample_record, write_sample_photos};
    use futures_util::StreamExt;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        record: PathBuf,
        config: Config,
    }

    /// Backs up the sample data and photos, then points the asset
    /// directories somewhere empty for the restore.
    fn backed_up() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.backup.backups_dir = dir.path().join("backups");
        config.backup.device = Some("tablet-07".into());
        config.assets.photos_dir = dir.path().join("photos");
        config.assets.signatures_dir = dir.path().join("signatures");
        write_sample_photos(&config.assets.photos_dir);

        let summary = BackupOrchestrator::new(
            Arc::new(MemoryStore::with_data(4, sample_aggregate())),
            Arc::new(MemorySettings::with_values(sample_record().settings.values)),
            config.clone(),
        )
        .create_backup(CancellationToken::new())
        .run()
        .unwrap();

        config.assets.photos_dir = dir.path().join("restored/photos");
        config.assets.signatures_dir = dir.path().join("restored/signatures");
        Fixture {
            record: summary.backup_path,
            config,
            _dir: dir,
        }
    }

    fn stale_target() -> Arc<MemoryStore> {
        let mut stale = DatabaseAggregate::default();
        stale.organizations.push(Organization {
            id: "org-old".into(),
            ..Default::default()
        });
        Arc::new(MemoryStore::with_data(4, stale))
    }

    #[test]
    fn test_end_to_end_restore() {
        let fixture = backed_up();
        let store = stale_target();
        let settings = Arc::new(MemorySettings::new());
        let coordinator = RestoreCoordinator::new(store.clone(), settings.clone(), fixture.config.clone());

        let events: Vec<RestoreProgress> = coordinator
            .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new())
            .collect();

        let phases: Vec<RestorePhase> = events.iter().map(|e| e.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort_by_key(|p| *p as u8);
        assert_eq!(phases, sorted, "phases must only move forward");

        let tables = events
            .iter()
            .filter(|e| matches!(e, RestoreProgress::TableImported { .. }))
            .count();
        let files = events
            .iter()
            .filter(|e| matches!(e, RestoreProgress::FileExtracted { .. }))
            .count();
        assert_eq!(tables, Table::IMPORT_ORDER.len());
        assert_eq!(files, 5);

        let expected_rows = sample_aggregate().total_rows();
        assert_eq!(
            events.last(),
            Some(&RestoreProgress::Completed {
                restored_records: expected_rows,
                warnings: vec![],
            })
        );

        assert_eq!(store.contents().unwrap(), sample_aggregate());
        assert_eq!(settings.export_all().unwrap(), sample_record().settings.values);
        assert_eq!(
            fs::read(fixture.config.assets.photos_dir.join("report-2/photo_5.jpg")).unwrap(),
            photo_bytes(5)
        );
    }

    #[test]
    fn test_tampered_record_stops_before_import() {
        let fixture = backed_up();
        let text = fs::read_to_string(&fixture.record).unwrap();
        fs::write(&fixture.record, text.replacen("Main plant", "Main plant!", 1)).unwrap();

        let store = stale_target();
        let before = store.contents().unwrap();
        let mut task = RestoreCoordinator::new(store.clone(), Arc::new(MemorySettings::new()), fixture.config)
            .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new());
        let events: Vec<RestoreProgress> = task.by_ref().collect();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], RestoreProgress::Error { message } if message.contains("possible corruption")));
        assert_eq!(task.phase(), RestorePhase::Error);
        assert_eq!(store.contents().unwrap(), before);
    }

    #[test]
    fn test_run_keeps_validation_error() {
        let fixture = backed_up();
        let text = fs::read_to_string(&fixture.record).unwrap();
        fs::write(&fixture.record, text.replacen("Main plant", "Main plant!", 1)).unwrap();

        let store = stale_target();
        let before = store.contents().unwrap();
        let err = RestoreCoordinator::new(store.clone(), Arc::new(MemorySettings::new()), fixture.config)
            .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new())
            .run()
            .unwrap_err();

        match err {
            BackupError::Validation(report) => {
                assert!(report.errors.iter().any(|e| e.contains("possible corruption")), "{report:?}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
        assert_eq!(store.contents().unwrap(), before);
    }

    #[test]
    fn test_run_reports_cancellation() {
        let fixture = backed_up();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = RestoreCoordinator::new(stale_target(), Arc::new(MemorySettings::new()), fixture.config)
            .restore(&fixture.record, RestoreStrategy::ReplaceAll, cancel)
            .run()
            .unwrap_err();
        assert!(matches!(err, BackupError::Cancelled), "{err:?}");
    }

    #[test]
    fn test_unsupported_strategy_errors_immediately() {
        let fixture = backed_up();
        let events: Vec<RestoreProgress> =
            RestoreCoordinator::new(stale_target(), Arc::new(MemorySettings::new()), fixture.config)
                .restore(&fixture.record, RestoreStrategy::Merge, CancellationToken::new())
                .collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RestoreProgress::Error { message } if message.contains("merge")));
    }

    #[test]
    fn test_empty_settings_values_are_skipped() {
        let fixture = backed_up();
        let mut record = crate::serializer::read_file(&fixture.record).unwrap();
        record.settings.values.insert("blank".into(), String::new());
        crate::serializer::seal(&mut record).unwrap();
        crate::serializer::write_file(&fixture.record, &record).unwrap();

        let mut existing = BTreeMap::new();
        existing.insert("blank".to_string(), "keep me".to_string());
        let settings = Arc::new(MemorySettings::with_values(existing));

        RestoreCoordinator::new(stale_target(), settings.clone(), fixture.config)
            .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new())
            .run()
            .unwrap();

        let values = settings.export_all().unwrap();
        assert_eq!(values.get("blank").map(String::as_str), Some("keep me"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_missing_archive_is_error_after_import() {
        let fixture = backed_up();
        fs::remove_file(fixture.record.with_file_name("photos.zip")).unwrap();

        let store = stale_target();
        let events: Vec<RestoreProgress> =
            RestoreCoordinator::new(store.clone(), Arc::new(MemorySettings::new()), fixture.config)
                .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new())
                .collect();

        assert!(matches!(events.last(), Some(RestoreProgress::Error { message }) if message.contains("photos.zip")));
        // Import already committed; it is not rolled back.
        assert_eq!(store.contents().unwrap(), sample_aggregate());
    }

    #[tokio::test]
    async fn test_stream_form() {
        let fixture = backed_up();
        let events: Vec<RestoreProgress> =
            RestoreCoordinator::new(stale_target(), Arc::new(MemorySettings::new()), fixture.config)
                .restore(&fixture.record, RestoreStrategy::ReplaceAll, CancellationToken::new())
                .into_stream()
                .collect()
                .await;
        assert_eq!(events.last().map(|e| e.phase()), Some(RestorePhase::Completed));
    }
}
