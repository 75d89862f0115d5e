//! Intervention reports and the rows hanging off them.

use super::{opt_ts_from_row, opt_ts_to_sql, ts_from_row, ts_to_sql};
use fieldvault_core::model::{Association, Attachment, Report, ReportItem, SparePart};
use rusqlite::{params, Connection, Row};

fn row_to_report(row: &Row) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        site_id: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        technician: row.get(4)?,
        scheduled_at: opt_ts_from_row(row, 5)?,
        completed_at: opt_ts_from_row(row, 6)?,
        created_at: ts_from_row(row, 7)?,
        updated_at: ts_from_row(row, 8)?,
        deleted_at: opt_ts_from_row(row, 9)?,
    })
}

pub fn find_reports(conn: &Connection) -> anyhow::Result<Vec<Report>> {
    let mut stmt = conn.prepare(
        "SELECT id, site_id, title, status, technician, scheduled_at, completed_at,
                created_at, updated_at, deleted_at
         FROM reports ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_report)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_report(conn: &Connection, report: &Report) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO reports (id, site_id, title, status, technician, scheduled_at, completed_at,
                              created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            report.id,
            report.site_id,
            report.title,
            report.status,
            report.technician,
            opt_ts_to_sql(&report.scheduled_at),
            opt_ts_to_sql(&report.completed_at),
            ts_to_sql(&report.created_at),
            ts_to_sql(&report.updated_at),
            opt_ts_to_sql(&report.deleted_at),
        ],
    )?;
    Ok(())
}

fn row_to_item(row: &Row) -> rusqlite::Result<ReportItem> {
    Ok(ReportItem {
        id: row.get(0)?,
        report_id: row.get(1)?,
        position: row.get(2)?,
        description: row.get(3)?,
        quantity: row.get(4)?,
        created_at: ts_from_row(row, 5)?,
    })
}

pub fn find_items(conn: &Connection) -> anyhow::Result<Vec<ReportItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, position, description, quantity, created_at
         FROM report_items ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_item)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_item(conn: &Connection, item: &ReportItem) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO report_items (id, report_id, position, description, quantity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            item.id,
            item.report_id,
            item.position,
            item.description,
            item.quantity,
            ts_to_sql(&item.created_at),
        ],
    )?;
    Ok(())
}

fn row_to_attachment(row: &Row) -> rusqlite::Result<Attachment> {
    let size: i64 = row.get(5)?;
    Ok(Attachment {
        id: row.get(0)?,
        report_id: row.get(1)?,
        kind: row.get(2)?,
        file_name: row.get(3)?,
        relative_path: row.get(4)?,
        size_bytes: u64::try_from(size).unwrap_or(0),
        created_at: ts_from_row(row, 6)?,
    })
}

pub fn find_attachments(conn: &Connection) -> anyhow::Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, kind, file_name, relative_path, size_bytes, created_at
         FROM attachments ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_attachment)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_attachment(conn: &Connection, attachment: &Attachment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attachments (id, report_id, kind, file_name, relative_path, size_bytes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            attachment.id,
            attachment.report_id,
            attachment.kind,
            attachment.file_name,
            attachment.relative_path,
            i64::try_from(attachment.size_bytes).unwrap_or(i64::MAX),
            ts_to_sql(&attachment.created_at),
        ],
    )?;
    Ok(())
}

fn row_to_spare_part(row: &Row) -> rusqlite::Result<SparePart> {
    Ok(SparePart {
        id: row.get(0)?,
        report_id: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
        quantity: row.get(4)?,
        created_at: ts_from_row(row, 5)?,
    })
}

pub fn find_spare_parts(conn: &Connection) -> anyhow::Result<Vec<SparePart>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, code, description, quantity, created_at
         FROM spare_parts ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_spare_part)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_spare_part(conn: &Connection, part: &SparePart) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO spare_parts (id, report_id, code, description, quantity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            part.id,
            part.report_id,
            part.code,
            part.description,
            part.quantity,
            ts_to_sql(&part.created_at),
        ],
    )?;
    Ok(())
}

fn row_to_association(row: &Row) -> rusqlite::Result<Association> {
    Ok(Association {
        id: row.get(0)?,
        report_id: row.get(1)?,
        site_unit_id: row.get(2)?,
        created_at: ts_from_row(row, 3)?,
    })
}

pub fn find_associations(conn: &Connection) -> anyhow::Result<Vec<Association>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, site_unit_id, created_at FROM associations ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_association)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_association(conn: &Connection, assoc: &Association) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO associations (id, report_id, site_unit_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            assoc.id,
            assoc.report_id,
            assoc.site_unit_id,
            ts_to_sql(&assoc.created_at),
        ],
    )?;
    Ok(())
}
