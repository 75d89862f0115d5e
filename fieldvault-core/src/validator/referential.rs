//! Referential integrity of a database aggregate.
//!
//! Every foreign key must resolve to a row of its parent table and primary
//! keys must be unique per table. Any violation would make a
//! dependency-ordered import fail against a store that enforces keys.

use super::ValidationReport;
use crate::model::{DatabaseAggregate, Table};
use std::collections::{HashMap, HashSet};

pub fn check(database: &DatabaseAggregate, report: &mut ValidationReport) {
    let ids: HashMap<Table, HashSet<&str>> = Table::IMPORT_ORDER
        .iter()
        .map(|t| (*t, database.ids(*t)))
        .collect();

    for table in Table::IMPORT_ORDER {
        let mut seen = HashSet::new();
        for row in database.rows(table).keys() {
            if !seen.insert(row.id) {
                report.error(format!("{table}: duplicate id '{}'", row.id));
            }
            for fk in &row.foreign_keys {
                let resolved = ids.get(&fk.parent).is_some_and(|p| p.contains(fk.value));
                if !resolved {
                    report.error(format!(
                        "{table} '{}': {} '{}' not found in {}",
                        row.id, fk.column, fk.value, fk.parent
                    ));
                }
            }
        }
    }
}
