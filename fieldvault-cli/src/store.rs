//! SQLite implementation of the engine's table and settings stores.

use crate::db::connection::DbPool;
use crate::db::migrate;
use crate::models::{directory, report, settings};
use fieldvault_core::model::{DatabaseAggregate, Table, TableRows};
use fieldvault_core::{BackupError, Result, SettingsStore, TableStore, TableWriter};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fmt::Display;

fn store_err(e: impl Display) -> BackupError {
    BackupError::Store(e.to_string())
}

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TableStore for SqliteStore {
    fn schema_version(&self) -> Result<i64> {
        let conn = self.pool.get().map_err(store_err)?;
        migrate::schema_version(&conn).map_err(store_err)
    }

    fn load(&self, table: Table, into: &mut DatabaseAggregate) -> Result<()> {
        let conn = self.pool.get().map_err(store_err)?;
        load_table(&conn, table, into).map_err(store_err)
    }

    fn count(&self, table: Table) -> Result<usize> {
        let conn = self.pool.get().map_err(store_err)?;
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
                row.get(0)
            })
            .map_err(store_err)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TableWriter) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;
        {
            let mut writer = SqliteWriter { conn: &tx };
            // Dropping `tx` without commit rolls back
            work(&mut writer)?;
        }
        tx.commit().map_err(store_err)
    }
}

fn load_table(conn: &Connection, table: Table, into: &mut DatabaseAggregate) -> anyhow::Result<()> {
    match table {
        Table::Organizations => into.organizations.extend(directory::find_organizations(conn)?),
        Table::Sites => into.sites.extend(directory::find_sites(conn)?),
        Table::SiteUnits => into.site_units.extend(directory::find_site_units(conn)?),
        Table::Contacts => into.contacts.extend(directory::find_contacts(conn)?),
        Table::Reports => into.reports.extend(report::find_reports(conn)?),
        Table::ReportItems => into.report_items.extend(report::find_items(conn)?),
        Table::Attachments => into.attachments.extend(report::find_attachments(conn)?),
        Table::SpareParts => into.spare_parts.extend(report::find_spare_parts(conn)?),
        Table::Associations => into.associations.extend(report::find_associations(conn)?),
    }
    Ok(())
}

struct SqliteWriter<'c> {
    conn: &'c Connection,
}

impl TableWriter for SqliteWriter<'_> {
    fn clear(&mut self, table: Table) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", table.name()), [])
            .map_err(store_err)?;
        Ok(())
    }

    fn insert(&mut self, rows: TableRows<'_>) -> Result<usize> {
        insert_rows(self.conn, rows).map_err(store_err)?;
        Ok(rows.len())
    }
}

fn insert_rows(conn: &Connection, rows: TableRows<'_>) -> anyhow::Result<()> {
    match rows {
        TableRows::Organizations(rows) => rows.iter().try_for_each(|r| directory::insert_organization(conn, r)),
        TableRows::Sites(rows) => rows.iter().try_for_each(|r| directory::insert_site(conn, r)),
        TableRows::SiteUnits(rows) => rows.iter().try_for_each(|r| directory::insert_site_unit(conn, r)),
        TableRows::Contacts(rows) => rows.iter().try_for_each(|r| directory::insert_contact(conn, r)),
        TableRows::Reports(rows) => rows.iter().try_for_each(|r| report::insert_report(conn, r)),
        TableRows::ReportItems(rows) => rows.iter().try_for_each(|r| report::insert_item(conn, r)),
        TableRows::Attachments(rows) => rows.iter().try_for_each(|r| report::insert_attachment(conn, r)),
        TableRows::SpareParts(rows) => rows.iter().try_for_each(|r| report::insert_spare_part(conn, r)),
        TableRows::Associations(rows) => rows.iter().try_for_each(|r| report::insert_association(conn, r)),
    }
}

pub struct SqliteSettings {
    pool: DbPool,
}

impl SqliteSettings {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsStore for SqliteSettings {
    fn export_all(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.pool.get().map_err(store_err)?;
        settings::get_all(&conn).map_err(store_err)
    }

    fn merge(&self, values: &BTreeMap<String, String>) -> Result<usize> {
        let mut conn = self.pool.get().map_err(store_err)?;
        let tx = conn.transaction().map_err(store_err)?;
        for (key, value) in values {
            settings::set(&tx, key, value).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::memory_pool;
    use chrono::{TimeZone, Utc};
    use fieldvault_core::model::*;
    use fieldvault_core::{DatabaseSnapshotter, RestoreStrategy};
    use std::sync::Arc;

    fn migrated_pool() -> DbPool {
        let pool = memory_pool().unwrap();
        migrate::migrate(&pool).unwrap();
        pool
    }

    fn source() -> DatabaseAggregate {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 15, 0).unwrap();
        let mut agg = DatabaseAggregate::default();
        for i in 1..=3 {
            agg.organizations.push(Organization {
                id: format!("org-{i}"),
                name: format!("Customer {i}"),
                vat_number: (i == 2).then(|| "IT00000000002".to_string()),
                created_at: at,
                updated_at: at,
                deleted_at: (i == 3).then_some(at),
            });
        }
        agg.sites.push(Site {
            id: "site-1".into(),
            organization_id: "org-1".into(),
            name: "Plant".into(),
            address: "Via Roma 1".into(),
            created_at: at,
            updated_at: at,
            deleted_at: None,
        });
        agg.site_units.push(SiteUnit {
            id: "unit-1".into(),
            site_id: "site-1".into(),
            name: "Boiler".into(),
            kind: "boiler".into(),
            serial_number: Some("SN-1".into()),
            created_at: at,
            deleted_at: None,
        });
        agg.contacts.push(Contact {
            id: "contact-1".into(),
            organization_id: Some("org-1".into()),
            name: "Anna".into(),
            email: Some("anna@example.com".into()),
            phone: None,
            created_at: at,
            deleted_at: None,
        });
        for i in 1..=2 {
            agg.reports.push(Report {
                id: format!("rep-{i}"),
                site_id: Some("site-1".into()),
                title: format!("Service visit {i}"),
                status: "closed".into(),
                technician: "Marco".into(),
                scheduled_at: Some(at),
                completed_at: None,
                created_at: at,
                updated_at: at,
                deleted_at: None,
            });
        }
        agg.report_items.push(ReportItem {
            id: "item-1".into(),
            report_id: "rep-1".into(),
            position: 1,
            description: "Replace filter".into(),
            quantity: 2,
            created_at: at,
        });
        agg.attachments.push(Attachment {
            id: "att-1".into(),
            report_id: "rep-1".into(),
            kind: "photo".into(),
            file_name: "front.jpg".into(),
            relative_path: "rep-1/front.jpg".into(),
            size_bytes: 2048,
            created_at: at,
        });
        agg.spare_parts.push(SparePart {
            id: "part-1".into(),
            report_id: "rep-2".into(),
            code: "F-100".into(),
            description: "Filter".into(),
            quantity: 1,
            created_at: at,
        });
        agg.associations.push(Association {
            id: "assoc-1".into(),
            report_id: "rep-2".into(),
            site_unit_id: "unit-1".into(),
            created_at: at,
        });
        agg
    }

    fn stale_rows(pool: &DbPool) {
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO organizations (id, name, created_at, updated_at)
               VALUES ('org-old', 'Former', '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z');
             INSERT INTO sites (id, organization_id, name, created_at, updated_at)
               VALUES ('site-old', 'org-old', 'Old site', '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z');",
        )
        .unwrap();
    }

    #[test]
    fn test_replace_all_on_populated_database() {
        let pool = migrated_pool();
        stale_rows(&pool);
        let store = Arc::new(SqliteStore::new(pool));
        let snapshotter = DatabaseSnapshotter::new(store.clone());
        let source = source();

        let inserted = snapshotter
            .import_all(&source, RestoreStrategy::ReplaceAll)
            .unwrap();

        assert_eq!(inserted, source.total_rows());
        for table in Table::IMPORT_ORDER {
            assert_eq!(store.count(table).unwrap(), source.row_count(table), "{table}");
        }
        assert_eq!(snapshotter.export_all().unwrap(), source);
    }

    #[test]
    fn test_foreign_key_failure_rolls_back() {
        let pool = migrated_pool();
        stale_rows(&pool);
        let store = Arc::new(SqliteStore::new(pool));
        let snapshotter = DatabaseSnapshotter::new(store.clone());
        let before = snapshotter.export_all().unwrap();

        let mut broken = source();
        broken.associations[0].site_unit_id = "unit-ghost".into();

        let err = snapshotter
            .import_all(&broken, RestoreStrategy::ReplaceAll)
            .unwrap_err();
        assert!(matches!(err, BackupError::Import { ref table, .. } if table == "associations"));
        assert_eq!(snapshotter.export_all().unwrap(), before);
        assert_eq!(store.count(Table::Sites).unwrap(), 1);
    }

    #[test]
    fn test_schema_version_reported() {
        let store = SqliteStore::new(migrated_pool());
        assert_eq!(store.schema_version().unwrap(), migrate::SCHEMA_VERSION);
    }

    #[test]
    fn test_settings_merge_overwrites() {
        let pool = migrated_pool();
        settings::set(&pool.get().unwrap(), "theme", "dark").unwrap();
        let store = SqliteSettings::new(pool.clone());

        let mut incoming = BTreeMap::new();
        incoming.insert("theme".to_string(), "light".to_string());
        incoming.insert("locale".to_string(), "it-IT".to_string());
        assert_eq!(store.merge(&incoming).unwrap(), 2);

        assert_eq!(store.export_all().unwrap(), incoming);
        assert_eq!(
            settings::get(&pool.get().unwrap(), "theme").unwrap(),
            Some("light".to_string())
        );
        assert_eq!(settings::get(&pool.get().unwrap(), "missing").unwrap(), None);
    }
}
