//! Whole-datastore export and import.
//!
//! Export reads every table, soft-deleted rows included. Import under
//! `ReplaceAll` clears children first, then inserts parents first, all inside
//! one store transaction.

pub mod memory;
pub mod store;

pub use memory::{MemorySettings, MemoryStore};
pub use store::{SettingsStore, TableStore, TableWriter};

use crate::model::{DatabaseAggregate, Table};
use crate::utils::errors::{BackupError, Result};
use crate::validator::{referential, ValidationReport};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Conflict resolution applied when importing into a populated store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreStrategy {
    #[default]
    ReplaceAll,
    Merge,
    SkipExisting,
}

impl RestoreStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RestoreStrategy::ReplaceAll => "replace-all",
            RestoreStrategy::Merge => "merge",
            RestoreStrategy::SkipExisting => "skip-existing",
        }
    }

    /// Only full replacement is implemented.
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            RestoreStrategy::ReplaceAll => Ok(()),
            other => Err(BackupError::UnsupportedStrategy(other.name().to_string())),
        }
    }
}

impl fmt::Display for RestoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RestoreStrategy {
    type Err = BackupError;

    /// Accepts `replace-all`, `replace_all` or `REPLACE_ALL` spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "replace-all" => Ok(RestoreStrategy::ReplaceAll),
            "merge" => Ok(RestoreStrategy::Merge),
            "skip-existing" => Ok(RestoreStrategy::SkipExisting),
            other => Err(BackupError::Config(format!(
                "unknown restore strategy '{other}'"
            ))),
        }
    }
}

/// Import progress after one table has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProgress {
    pub table: Table,
    /// Rows inserted so far, across all tables.
    pub processed: usize,
    pub total: usize,
}

pub struct DatabaseSnapshotter {
    store: Arc<dyn TableStore>,
}

impl DatabaseSnapshotter {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.store.schema_version()
    }

    pub fn export_all(&self) -> Result<DatabaseAggregate> {
        self.export_with_progress(|_, _| Ok(()))
    }

    /// Export table by table; `on_table` sees each table and its row count
    /// and may abort the export by returning an error.
    pub fn export_with_progress<F>(&self, mut on_table: F) -> Result<DatabaseAggregate>
    where
        F: FnMut(Table, usize) -> Result<()>,
    {
        let mut aggregate = DatabaseAggregate::default();
        for table in Table::IMPORT_ORDER {
            let rows = self.export_table(table, &mut aggregate)?;
            on_table(table, rows)?;
        }
        info!("Exported {} rows", aggregate.total_rows());
        Ok(aggregate)
    }

    /// Load one table into `into`, returning its row count.
    pub fn export_table(&self, table: Table, into: &mut DatabaseAggregate) -> Result<usize> {
        into.clear_table(table);
        self.store.load(table, into)?;
        let rows = into.row_count(table);
        debug!("Exported {} rows from {}", rows, table);
        Ok(rows)
    }

    pub fn import_all(
        &self,
        aggregate: &DatabaseAggregate,
        strategy: RestoreStrategy,
    ) -> Result<usize> {
        self.import_with_progress(aggregate, strategy, |_| Ok(()))
    }

    /// Import inside one transaction. `on_table` runs after each table is
    /// written; an error from it (or from any row) rolls everything back.
    /// Returns the number of rows inserted.
    pub fn import_with_progress<F>(
        &self,
        aggregate: &DatabaseAggregate,
        strategy: RestoreStrategy,
        mut on_table: F,
    ) -> Result<usize>
    where
        F: FnMut(&TableProgress) -> Result<()>,
    {
        strategy.ensure_supported()?;

        let total = aggregate.total_rows();
        let mut inserted = 0usize;

        self.store.transaction(&mut |writer: &mut dyn TableWriter| {
            inserted = 0;
            for table in Table::clear_order() {
                writer.clear(table).map_err(|e| import_error(table, e))?;
            }
            for table in Table::IMPORT_ORDER {
                let written = writer
                    .insert(aggregate.rows(table))
                    .map_err(|e| import_error(table, e))?;
                inserted += written;
                debug!("Imported {} rows into {}", written, table);
                on_table(&TableProgress {
                    table,
                    processed: inserted,
                    total,
                })?;
            }
            Ok(())
        })?;

        info!("Imported {} rows ({})", inserted, strategy);
        Ok(inserted)
    }

    /// Referential checks over the live store.
    pub fn validate_integrity(&self) -> Result<ValidationReport> {
        let aggregate = self.export_all()?;
        let mut report = ValidationReport::default();
        referential::check(&aggregate, &mut report);
        Ok(report)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.store.transaction(&mut |writer: &mut dyn TableWriter| {
            for table in Table::clear_order() {
                writer.clear(table)?;
            }
            Ok(())
        })?;
        info!("Cleared all tables");
        Ok(())
    }

    /// Total rows across every table, without loading them.
    pub fn estimate_record_count(&self) -> Result<usize> {
        Table::IMPORT_ORDER
            .iter()
            .map(|t| self.store.count(*t))
            .sum()
    }
}

fn import_error(table: Table, err: BackupError) -> BackupError {
    match err {
        BackupError::Import { .. } | BackupError::Cancelled => err,
        other => BackupError::Import {
            table: table.name().to_string(),
            reason: other.to_string(),
        },
    }
}
