//! Entity rows of the field-service datastore and the aggregate that holds
//! one ordered list per table.

use crate::serializer::{iso8601, lenient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub vat_number: Option<String>,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "iso8601::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub organization_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "iso8601::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A piece of equipment or area inside a site.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUnit {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub serial_number: Option<String>,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso8601::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub organization_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso8601::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Primary business record: one intervention report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub site_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub technician: String,
    #[serde(default, with = "iso8601::option")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "iso8601")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "iso8601::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub report_id: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub position: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub quantity: i64,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

/// Metadata of a file attached to a report. The bytes live in an asset archive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub report_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub relative_path: String,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub size_bytes: u64,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparePart {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub report_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub quantity: i64,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

/// Cross-reference between a report and a site unit it covered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub report_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_unit_id: String,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

/// Relational tables, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Organizations,
    Sites,
    SiteUnits,
    Contacts,
    Reports,
    ReportItems,
    Attachments,
    SpareParts,
    Associations,
}

impl Table {
    /// Parents before children, so no foreign key ever points at a row not yet inserted.
    pub const IMPORT_ORDER: [Table; 9] = [
        Table::Organizations,
        Table::Sites,
        Table::SiteUnits,
        Table::Contacts,
        Table::Reports,
        Table::ReportItems,
        Table::Attachments,
        Table::SpareParts,
        Table::Associations,
    ];

    /// Children before parents.
    pub fn clear_order() -> impl Iterator<Item = Table> {
        Self::IMPORT_ORDER.into_iter().rev()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Table::Organizations => "organizations",
            Table::Sites => "sites",
            Table::SiteUnits => "site_units",
            Table::Contacts => "contacts",
            Table::Reports => "reports",
            Table::ReportItems => "report_items",
            Table::Attachments => "attachments",
            Table::SpareParts => "spare_parts",
            Table::Associations => "associations",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed view over the rows of one table.
#[derive(Debug, Clone, Copy)]
pub enum TableRows<'a> {
    Organizations(&'a [Organization]),
    Sites(&'a [Site]),
    SiteUnits(&'a [SiteUnit]),
    Contacts(&'a [Contact]),
    Reports(&'a [Report]),
    ReportItems(&'a [ReportItem]),
    Attachments(&'a [Attachment]),
    SpareParts(&'a [SparePart]),
    Associations(&'a [Association]),
}

impl<'a> TableRows<'a> {
    pub fn table(&self) -> Table {
        match self {
            TableRows::Organizations(_) => Table::Organizations,
            TableRows::Sites(_) => Table::Sites,
            TableRows::SiteUnits(_) => Table::SiteUnits,
            TableRows::Contacts(_) => Table::Contacts,
            TableRows::Reports(_) => Table::Reports,
            TableRows::ReportItems(_) => Table::ReportItems,
            TableRows::Attachments(_) => Table::Attachments,
            TableRows::SpareParts(_) => Table::SpareParts,
            TableRows::Associations(_) => Table::Associations,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TableRows::Organizations(rows) => rows.len(),
            TableRows::Sites(rows) => rows.len(),
            TableRows::SiteUnits(rows) => rows.len(),
            TableRows::Contacts(rows) => rows.len(),
            TableRows::Reports(rows) => rows.len(),
            TableRows::ReportItems(rows) => rows.len(),
            TableRows::Attachments(rows) => rows.len(),
            TableRows::SpareParts(rows) => rows.len(),
            TableRows::Associations(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Primary key and foreign keys of every row, in row order.
    pub fn keys(&self) -> Vec<RowKeys<'a>> {
        fn fk<'r>(column: &'static str, parent: Table, value: &'r str) -> ForeignKey<'r> {
            ForeignKey { column, parent, value }
        }

        match *self {
            TableRows::Organizations(rows) => rows.iter().map(|r| RowKeys::new(&r.id, vec![])).collect(),
            TableRows::Sites(rows) => rows
                .iter()
                .map(|r| RowKeys::new(&r.id, vec![fk("organization_id", Table::Organizations, &r.organization_id)]))
                .collect(),
            TableRows::SiteUnits(rows) => rows
                .iter()
                .map(|r| RowKeys::new(&r.id, vec![fk("site_id", Table::Sites, &r.site_id)]))
                .collect(),
            TableRows::Contacts(rows) => rows
                .iter()
                .map(|r| {
                    let fks = r
                        .organization_id
                        .as_deref()
                        .map(|v| fk("organization_id", Table::Organizations, v))
                        .into_iter()
                        .collect();
                    RowKeys::new(&r.id, fks)
                })
                .collect(),
            TableRows::Reports(rows) => rows
                .iter()
                .map(|r| {
                    let fks = r
                        .site_id
                        .as_deref()
                        .map(|v| fk("site_id", Table::Sites, v))
                        .into_iter()
                        .collect();
                    RowKeys::new(&r.id, fks)
                })
                .collect(),
            TableRows::ReportItems(rows) => rows
                .iter()
                .map(|r| RowKeys::new(&r.id, vec![fk("report_id", Table::Reports, &r.report_id)]))
                .collect(),
            TableRows::Attachments(rows) => rows
                .iter()
                .map(|r| RowKeys::new(&r.id, vec![fk("report_id", Table::Reports, &r.report_id)]))
                .collect(),
            TableRows::SpareParts(rows) => rows
                .iter()
                .map(|r| RowKeys::new(&r.id, vec![fk("report_id", Table::Reports, &r.report_id)]))
                .collect(),
            TableRows::Associations(rows) => rows
                .iter()
                .map(|r| {
                    RowKeys::new(
                        &r.id,
                        vec![
                            fk("report_id", Table::Reports, &r.report_id),
                            fk("site_unit_id", Table::SiteUnits, &r.site_unit_id),
                        ],
                    )
                })
                .collect(),
        }
    }
}

/// A reference from a row to the primary key of a row in `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey<'a> {
    pub column: &'static str,
    pub parent: Table,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKeys<'a> {
    pub id: &'a str,
    pub foreign_keys: Vec<ForeignKey<'a>>,
}

impl<'a> RowKeys<'a> {
    fn new(id: &'a str, foreign_keys: Vec<ForeignKey<'a>>) -> Self {
        Self { id, foreign_keys }
    }
}

/// Plain snapshot of every table. Referential integrity is not enforced here;
/// see `validator::referential`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAggregate {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub site_units: Vec<SiteUnit>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub reports: Vec<Report>,
    #[serde(default)]
    pub report_items: Vec<ReportItem>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub spare_parts: Vec<SparePart>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl DatabaseAggregate {
    pub fn rows(&self, table: Table) -> TableRows<'_> {
        match table {
            Table::Organizations => TableRows::Organizations(&self.organizations),
            Table::Sites => TableRows::Sites(&self.sites),
            Table::SiteUnits => TableRows::SiteUnits(&self.site_units),
            Table::Contacts => TableRows::Contacts(&self.contacts),
            Table::Reports => TableRows::Reports(&self.reports),
            Table::ReportItems => TableRows::ReportItems(&self.report_items),
            Table::Attachments => TableRows::Attachments(&self.attachments),
            Table::SpareParts => TableRows::SpareParts(&self.spare_parts),
            Table::Associations => TableRows::Associations(&self.associations),
        }
    }

    pub fn row_count(&self, table: Table) -> usize {
        self.rows(table).len()
    }

    /// Primary keys present in `table`.
    pub fn ids(&self, table: Table) -> HashSet<&str> {
        self.rows(table).keys().into_iter().map(|k| k.id).collect()
    }

    pub fn total_rows(&self) -> usize {
        Table::IMPORT_ORDER.iter().map(|t| self.row_count(*t)).sum()
    }

    /// Append cloned rows to the matching table.
    pub fn append(&mut self, rows: TableRows<'_>) {
        match rows {
            TableRows::Organizations(r) => self.organizations.extend_from_slice(r),
            TableRows::Sites(r) => self.sites.extend_from_slice(r),
            TableRows::SiteUnits(r) => self.site_units.extend_from_slice(r),
            TableRows::Contacts(r) => self.contacts.extend_from_slice(r),
            TableRows::Reports(r) => self.reports.extend_from_slice(r),
            TableRows::ReportItems(r) => self.report_items.extend_from_slice(r),
            TableRows::Attachments(r) => self.attachments.extend_from_slice(r),
            TableRows::SpareParts(r) => self.spare_parts.extend_from_slice(r),
            TableRows::Associations(r) => self.associations.extend_from_slice(r),
        }
    }

    pub fn clear_table(&mut self, table: Table) {
        match table {
            Table::Organizations => self.organizations.clear(),
            Table::Sites => self.sites.clear(),
            Table::SiteUnits => self.site_units.clear(),
            Table::Contacts => self.contacts.clear(),
            Table::Reports => self.reports.clear(),
            Table::ReportItems => self.report_items.clear(),
            Table::Attachments => self.attachments.clear(),
            Table::SpareParts => self.spare_parts.clear(),
            Table::Associations => self.associations.clear(),
        }
    }
}
