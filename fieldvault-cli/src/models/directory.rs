//! Customer directory: organizations, their sites and site units, contacts.

use super::{opt_ts_from_row, opt_ts_to_sql, ts_from_row, ts_to_sql};
use fieldvault_core::model::{Contact, Organization, Site, SiteUnit};
use rusqlite::{params, Connection, Row};

fn row_to_organization(row: &Row) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        vat_number: row.get(2)?,
        created_at: ts_from_row(row, 3)?,
        updated_at: ts_from_row(row, 4)?,
        deleted_at: opt_ts_from_row(row, 5)?,
    })
}

pub fn find_organizations(conn: &Connection) -> anyhow::Result<Vec<Organization>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, vat_number, created_at, updated_at, deleted_at
         FROM organizations ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_organization)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_organization(conn: &Connection, org: &Organization) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO organizations (id, name, vat_number, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            org.id,
            org.name,
            org.vat_number,
            ts_to_sql(&org.created_at),
            ts_to_sql(&org.updated_at),
            opt_ts_to_sql(&org.deleted_at),
        ],
    )?;
    Ok(())
}

fn row_to_site(row: &Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        created_at: ts_from_row(row, 4)?,
        updated_at: ts_from_row(row, 5)?,
        deleted_at: opt_ts_from_row(row, 6)?,
    })
}

pub fn find_sites(conn: &Connection) -> anyhow::Result<Vec<Site>> {
    let mut stmt = conn.prepare(
        "SELECT id, organization_id, name, address, created_at, updated_at, deleted_at
         FROM sites ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_site)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_site(conn: &Connection, site: &Site) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sites (id, organization_id, name, address, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            site.id,
            site.organization_id,
            site.name,
            site.address,
            ts_to_sql(&site.created_at),
            ts_to_sql(&site.updated_at),
            opt_ts_to_sql(&site.deleted_at),
        ],
    )?;
    Ok(())
}

fn row_to_site_unit(row: &Row) -> rusqlite::Result<SiteUnit> {
    Ok(SiteUnit {
        id: row.get(0)?,
        site_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        serial_number: row.get(4)?,
        created_at: ts_from_row(row, 5)?,
        deleted_at: opt_ts_from_row(row, 6)?,
    })
}

pub fn find_site_units(conn: &Connection) -> anyhow::Result<Vec<SiteUnit>> {
    let mut stmt = conn.prepare(
        "SELECT id, site_id, name, kind, serial_number, created_at, deleted_at
         FROM site_units ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_site_unit)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_site_unit(conn: &Connection, unit: &SiteUnit) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO site_units (id, site_id, name, kind, serial_number, created_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            unit.id,
            unit.site_id,
            unit.name,
            unit.kind,
            unit.serial_number,
            ts_to_sql(&unit.created_at),
            opt_ts_to_sql(&unit.deleted_at),
        ],
    )?;
    Ok(())
}

fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        created_at: ts_from_row(row, 5)?,
        deleted_at: opt_ts_from_row(row, 6)?,
    })
}

pub fn find_contacts(conn: &Connection) -> anyhow::Result<Vec<Contact>> {
    let mut stmt = conn.prepare(
        "SELECT id, organization_id, name, email, phone, created_at, deleted_at
         FROM contacts ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], row_to_contact)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_contact(conn: &Connection, contact: &Contact) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO contacts (id, organization_id, name, email, phone, created_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            contact.id,
            contact.organization_id,
            contact.name,
            contact.email,
            contact.phone,
            ts_to_sql(&contact.created_at),
            opt_ts_to_sql(&contact.deleted_at),
        ],
    )?;
    Ok(())
}
