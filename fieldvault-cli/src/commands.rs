//! Subcommand handlers. Each returns `Err` on failure so the process exits
//! non-zero.

use crate::config::AppConfig;
use crate::db::connection::create_pool;
use crate::db::migrate::migrate;
use crate::store::{SqliteSettings, SqliteStore};
use anyhow::{bail, Context};
use fieldvault_core::progress::{format_bytes, format_duration};
use fieldvault_core::{
    BackupCatalog, BackupOrchestrator, BackupProgress, Config, DatabaseSnapshotter,
    IntegrityValidator, RestoreCoordinator, RestoreProgress, RestoreStrategy, SettingsStore,
    TableStore,
};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn open_stores(app: &AppConfig) -> anyhow::Result<(Arc<dyn TableStore>, Arc<dyn SettingsStore>)> {
    if let Some(parent) = app.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let pool = create_pool(&app.db_path)
        .with_context(|| format!("opening database {}", app.db_path.display()))?;
    migrate(&pool)?;
    Ok((
        Arc::new(SqliteStore::new(pool.clone())),
        Arc::new(SqliteSettings::new(pool)),
    ))
}

/// Token cancelled on the first Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received SIGINT, cancelling...");
            token.cancel();
        }
    });
    cancel
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub async fn create(app: &AppConfig, config: Config, json: bool) -> anyhow::Result<()> {
    let (tables, settings) = open_stores(app)?;
    let orchestrator = BackupOrchestrator::new(tables, settings, config);
    let stream = orchestrator.create_backup(cancel_on_ctrl_c()).into_stream();
    tokio::pin!(stream);

    while let Some(event) = stream.next().await {
        if json {
            print_json(&event)?;
        }
        match event {
            BackupProgress::Completed(summary) => {
                if !json {
                    println!(
                        "Backup {} written to {} ({}, {} tables, {})",
                        summary.backup_id,
                        summary.backup_path.display(),
                        format_bytes(summary.total_size),
                        summary.tables_backed_up,
                        format_duration(summary.duration)
                    );
                }
                return Ok(());
            }
            BackupProgress::Error { message } => bail!("backup failed: {}", message),
            BackupProgress::AssetsSkipped { kind, reason } if !json => {
                println!("Skipped {} assets: {}", kind.label(), reason);
            }
            BackupProgress::AssetsArchived { kind, file_count, archive_size } if !json => {
                println!(
                    "Archived {} {} files ({})",
                    file_count,
                    kind.label(),
                    format_bytes(archive_size)
                );
            }
            _ => {}
        }
    }
    bail!("backup ended without a result")
}

pub async fn restore(
    app: &AppConfig,
    config: Config,
    record: &Path,
    strategy: RestoreStrategy,
    json: bool,
) -> anyhow::Result<()> {
    let (tables, settings) = open_stores(app)?;
    let coordinator = RestoreCoordinator::new(tables, settings, config);
    let stream = coordinator
        .restore(record, strategy, cancel_on_ctrl_c())
        .into_stream();
    tokio::pin!(stream);

    while let Some(event) = stream.next().await {
        if json {
            print_json(&event)?;
        }
        match event {
            RestoreProgress::Completed { restored_records, warnings } => {
                if !json {
                    for warning in &warnings {
                        println!("warning: {}", warning);
                    }
                    println!("Restored {} records from {}", restored_records, record.display());
                }
                return Ok(());
            }
            RestoreProgress::Error { message } => bail!("restore failed: {}", message),
            RestoreProgress::AssetsVerified { kind, files } if !json => {
                println!("Restored {} {} files", files, kind.label());
            }
            _ => {}
        }
    }
    bail!("restore ended without a result")
}

pub fn validate(config: &Config, records: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let validator = IntegrityValidator::new(config.validation.clone());
    let reports = validator.batch_validate(records);

    if json {
        print_json(&reports)?;
    } else {
        for (path, report) in &reports {
            println!("{}: {}", path.display(), report);
            for error in &report.errors {
                println!("  error: {}", error);
            }
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
        }
    }

    let invalid = reports.values().filter(|r| !r.is_valid()).count();
    if invalid > 0 {
        bail!("{} of {} backups failed validation", invalid, reports.len());
    }
    Ok(())
}

pub fn check(config: &Config, record: &Path) -> anyhow::Result<()> {
    if IntegrityValidator::new(config.validation.clone()).quick_check(record) {
        println!("{}: ok", record.display());
        Ok(())
    } else {
        bail!("{}: not a usable backup", record.display())
    }
}

fn catalog(config: &Config) -> BackupCatalog {
    BackupCatalog::new(IntegrityValidator::new(config.validation.clone()))
}

pub fn list(config: &Config, json: bool) -> anyhow::Result<()> {
    let entries = catalog(config).list(&config.backup.backups_dir)?;
    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No backups in {}", config.backup.backups_dir.display());
    }
    for entry in &entries {
        println!(
            "{}  {:>10}  {}",
            entry.id,
            format_bytes(entry.size),
            if entry.valid { "ok" } else { "incomplete" }
        );
    }
    Ok(())
}

pub fn prune(config: &Config, keep: Option<usize>, incomplete: bool) -> anyhow::Result<()> {
    let catalog = catalog(config);
    let root = &config.backup.backups_dir;

    if incomplete {
        for id in catalog.remove_incomplete(root)? {
            println!("Removed incomplete backup {}", id);
        }
    }
    for id in catalog.prune(root, keep.unwrap_or(config.backup.keep))? {
        println!("Removed backup {}", id);
    }
    Ok(())
}

/// Schema version, row count and referential check of the live database.
pub fn status(app: &AppConfig, json: bool) -> anyhow::Result<()> {
    let (tables, _) = open_stores(app)?;
    let snapshotter = DatabaseSnapshotter::new(tables);
    let version = snapshotter.schema_version()?;
    let rows = snapshotter.estimate_record_count()?;
    let report = snapshotter.validate_integrity()?;

    if json {
        print_json(&serde_json::json!({
            "schemaVersion": version,
            "rows": rows,
            "integrity": report,
        }))?;
    } else {
        println!("Database:  {}", app.db_path.display());
        println!("Schema:    v{}", version);
        println!("Rows:      {}", rows);
        println!("Integrity: {}", report);
        for error in &report.errors {
            println!("  error: {}", error);
        }
    }

    if !report.is_valid() {
        bail!("database has {} referential errors", report.errors.len());
    }
    Ok(())
}
