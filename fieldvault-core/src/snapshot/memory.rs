//! In-process table and settings stores.
//!
//! `MemoryStore` enforces the same primary and foreign keys as the SQLite
//! schema, and its transactions work on a copy that is swapped in only on
//! success, so a failed import leaves it untouched.

use super::store::{SettingsStore, TableStore, TableWriter};
use crate::model::{DatabaseAggregate, Table, TableRows};
use crate::utils::errors::{BackupError, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

fn poisoned<T>(_: T) -> BackupError {
    BackupError::Store("memory store lock poisoned".to_string())
}

pub struct MemoryStore {
    tables: RwLock<DatabaseAggregate>,
    schema_version: i64,
}

impl MemoryStore {
    pub fn new(schema_version: i64) -> Self {
        Self::with_data(schema_version, DatabaseAggregate::default())
    }

    /// Seed the store without constraint checks.
    pub fn with_data(schema_version: i64, data: DatabaseAggregate) -> Self {
        Self {
            tables: RwLock::new(data),
            schema_version,
        }
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Result<DatabaseAggregate> {
        Ok(self.tables.read().map_err(poisoned)?.clone())
    }
}

impl TableStore for MemoryStore {
    fn schema_version(&self) -> Result<i64> {
        Ok(self.schema_version)
    }

    fn load(&self, table: Table, into: &mut DatabaseAggregate) -> Result<()> {
        let tables = self.tables.read().map_err(poisoned)?;
        into.append(tables.rows(table));
        Ok(())
    }

    fn count(&self, table: Table) -> Result<usize> {
        Ok(self.tables.read().map_err(poisoned)?.row_count(table))
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TableWriter) -> Result<()>,
    ) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let mut writer = MemoryWriter {
            tables: tables.clone(),
        };
        work(&mut writer)?;
        *tables = writer.tables;
        Ok(())
    }
}

struct MemoryWriter {
    tables: DatabaseAggregate,
}

impl TableWriter for MemoryWriter {
    fn clear(&mut self, table: Table) -> Result<()> {
        let child_tables = Table::IMPORT_ORDER.iter().filter(|t| **t != table);
        for child in child_tables {
            let parent_ids = self.tables.ids(table);
            let referenced = self
                .tables
                .rows(*child)
                .keys()
                .iter()
                .flat_map(|k| k.foreign_keys.iter())
                .any(|fk| fk.parent == table && parent_ids.contains(fk.value));
            if referenced {
                return Err(BackupError::Store(format!(
                    "cannot clear {table}: rows in {child} still reference it"
                )));
            }
        }
        self.tables.clear_table(table);
        Ok(())
    }

    fn insert(&mut self, rows: TableRows<'_>) -> Result<usize> {
        let table = rows.table();
        let mut seen: HashSet<String> = self
            .tables
            .ids(table)
            .into_iter()
            .map(str::to_string)
            .collect();

        for key in rows.keys() {
            if !seen.insert(key.id.to_string()) {
                return Err(BackupError::Store(format!(
                    "duplicate primary key '{}' in {table}",
                    key.id
                )));
            }
            for fk in &key.foreign_keys {
                if !self.tables.ids(fk.parent).contains(fk.value) {
                    return Err(BackupError::Store(format!(
                        "foreign key {table}.{} = '{}' has no row in {}",
                        fk.column, fk.value, fk.parent
                    )));
                }
            }
        }

        self.tables.append(rows);
        Ok(rows.len())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: BTreeMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn export_all(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.values.read().map_err(poisoned)?.clone())
    }

    fn merge(&self, values: &BTreeMap<String, String>) -> Result<usize> {
        let mut current = self.values.write().map_err(poisoned)?;
        for (k, v) in values {
            current.insert(k.clone(), v.clone());
        }
        Ok(values.len())
    }
}
