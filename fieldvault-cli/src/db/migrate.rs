use crate::db::connection::DbPool;
use rusqlite::Connection;

/// Bumped whenever `SCHEMA` or the column migrations below change.
pub const SCHEMA_VERSION: i64 = 3;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  vat_number TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS sites (
  id TEXT PRIMARY KEY,
  organization_id TEXT NOT NULL REFERENCES organizations(id),
  name TEXT NOT NULL,
  address TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS site_units (
  id TEXT PRIMARY KEY,
  site_id TEXT NOT NULL REFERENCES sites(id),
  name TEXT NOT NULL,
  kind TEXT NOT NULL DEFAULT '',
  serial_number TEXT,
  created_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS contacts (
  id TEXT PRIMARY KEY,
  organization_id TEXT REFERENCES organizations(id),
  name TEXT NOT NULL,
  email TEXT,
  created_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS reports (
  id TEXT PRIMARY KEY,
  site_id TEXT REFERENCES sites(id),
  title TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'draft',
  scheduled_at TEXT,
  completed_at TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS report_items (
  id TEXT PRIMARY KEY,
  report_id TEXT NOT NULL REFERENCES reports(id),
  position INTEGER NOT NULL DEFAULT 0,
  description TEXT NOT NULL DEFAULT '',
  quantity INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attachments (
  id TEXT PRIMARY KEY,
  report_id TEXT NOT NULL REFERENCES reports(id),
  kind TEXT NOT NULL CHECK(kind IN ('photo','signature')),
  file_name TEXT NOT NULL,
  relative_path TEXT NOT NULL,
  size_bytes INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS spare_parts (
  id TEXT PRIMARY KEY,
  report_id TEXT NOT NULL REFERENCES reports(id),
  code TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  quantity INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS associations (
  id TEXT PRIMARY KEY,
  report_id TEXT NOT NULL REFERENCES reports(id),
  site_unit_id TEXT NOT NULL REFERENCES site_units(id),
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_organization ON sites(organization_id);
CREATE INDEX IF NOT EXISTS idx_report_items_report ON report_items(report_id);
CREATE INDEX IF NOT EXISTS idx_attachments_report ON attachments(report_id);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    // Columns added after the first release
    if !has_column(&conn, "contacts", "phone")? {
        conn.execute_batch("ALTER TABLE contacts ADD COLUMN phone TEXT")?;
    }
    if !has_column(&conn, "reports", "technician")? {
        conn.execute_batch(
            "ALTER TABLE reports ADD COLUMN technician TEXT NOT NULL DEFAULT ''",
        )?;
    }

    if schema_version(&conn)? < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    }

    tracing::info!("[DB] Migration completed (schema v{})", SCHEMA_VERSION);
    Ok(())
}

pub fn schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns.iter().any(|c| c == column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::memory_pool;

    #[test]
    fn test_migrate_is_idempotent() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();
        migrate(&pool).unwrap();

        let conn = pool.get().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(has_column(&conn, "contacts", "phone").unwrap());
        assert!(has_column(&conn, "reports", "technician").unwrap());
    }

    #[test]
    fn test_foreign_keys_are_declared() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();
        let err = conn
            .execute(
                "INSERT INTO sites (id, organization_id, name, created_at, updated_at)
                 VALUES ('s1', 'missing', 'x', '2024-05-01T00:00:00Z', '2024-05-01T00:00:00Z')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"));
    }
}
