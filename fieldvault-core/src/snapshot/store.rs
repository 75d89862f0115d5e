//! Contracts the engine consumes from its host: relational table I/O and a
//! settings key/value store. Both are injected as trait objects.

use crate::model::{DatabaseAggregate, Table, TableRows};
use crate::utils::errors::Result;
use std::collections::BTreeMap;

/// Bulk read/write access to the relational datastore.
pub trait TableStore: Send + Sync {
    /// Schema version of the live datastore.
    fn schema_version(&self) -> Result<i64>;

    /// Append every row of `table` (soft-deleted rows included) to `into`.
    fn load(&self, table: Table, into: &mut DatabaseAggregate) -> Result<()>;

    /// Number of rows currently stored in `table`.
    fn count(&self, table: Table) -> Result<usize>;

    /// Run `work` inside one transaction. Commits only if `work` returns `Ok`;
    /// any error rolls back every write made through the writer.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TableWriter) -> Result<()>,
    ) -> Result<()>;
}

/// Writes available inside a [`TableStore::transaction`].
pub trait TableWriter {
    fn clear(&mut self, table: Table) -> Result<()>;

    /// Insert rows, returning how many were written.
    fn insert(&mut self, rows: TableRows<'_>) -> Result<usize>;
}

/// Flat key/value settings.
pub trait SettingsStore: Send + Sync {
    fn export_all(&self) -> Result<BTreeMap<String, String>>;

    /// Overwrite each given key (last writer wins). Returns keys written.
    fn merge(&self, values: &BTreeMap<String, String>) -> Result<usize>;
}
