//! Fixtures shared by unit tests.

use crate::digest::sha256_hex;
use crate::model::*;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 30, 0).unwrap()
}

/// 3 organizations, 2 sites, 2 site units, 2 contacts, 2 reports and their children.
pub fn sample_aggregate() -> DatabaseAggregate {
    let organizations = (1..=3)
        .map(|i| Organization {
            id: format!("org-{i}"),
            name: format!("Customer {i}"),
            vat_number: (i == 1).then(|| "IT01234567890".to_string()),
            created_at: ts(1, 8),
            updated_at: ts(1, 9),
            deleted_at: None,
        })
        .collect();

    let sites = vec![
        Site {
            id: "site-1".into(),
            organization_id: "org-1".into(),
            name: "Main plant".into(),
            address: "Via Roma 1".into(),
            created_at: ts(1, 8),
            updated_at: ts(1, 8),
            deleted_at: None,
        },
        Site {
            id: "site-2".into(),
            organization_id: "org-2".into(),
            name: "Warehouse".into(),
            address: "Via Milano 7".into(),
            created_at: ts(1, 8),
            updated_at: ts(1, 8),
            deleted_at: None,
        },
    ];

    let site_units = vec![
        SiteUnit {
            id: "unit-1".into(),
            site_id: "site-1".into(),
            name: "Boiler A".into(),
            kind: "boiler".into(),
            serial_number: Some("SN-001".into()),
            created_at: ts(1, 10),
            deleted_at: None,
        },
        SiteUnit {
            id: "unit-2".into(),
            site_id: "site-2".into(),
            name: "Chiller".into(),
            kind: "chiller".into(),
            serial_number: None,
            created_at: ts(1, 10),
            deleted_at: None,
        },
    ];

    let contacts = vec![
        Contact {
            id: "contact-1".into(),
            organization_id: Some("org-1".into()),
            name: "Anna Bianchi".into(),
            email: Some("anna@example.com".into()),
            phone: None,
            created_at: ts(1, 11),
            deleted_at: None,
        },
        Contact {
            id: "contact-2".into(),
            organization_id: None,
            name: "Walk-in".into(),
            email: None,
            phone: Some("+39 555 0100".into()),
            created_at: ts(1, 11),
            deleted_at: None,
        },
    ];

    let reports = vec![
        Report {
            id: "report-1".into(),
            site_id: Some("site-1".into()),
            title: "Annual boiler check".into(),
            status: "completed".into(),
            technician: "Marco".into(),
            scheduled_at: Some(ts(2, 9)),
            completed_at: Some(ts(2, 12)),
            created_at: ts(2, 8),
            updated_at: ts(2, 12),
            deleted_at: None,
        },
        Report {
            id: "report-2".into(),
            site_id: Some("site-2".into()),
            title: "Chiller leak".into(),
            status: "open".into(),
            technician: "Luca".into(),
            scheduled_at: None,
            completed_at: None,
            created_at: ts(3, 8),
            updated_at: ts(3, 8),
            deleted_at: None,
        },
    ];

    let report_items = vec![
        ReportItem {
            id: "item-1".into(),
            report_id: "report-1".into(),
            position: 1,
            description: "Burner cleaning".into(),
            quantity: 1,
            created_at: ts(2, 10),
        },
        ReportItem {
            id: "item-2".into(),
            report_id: "report-1".into(),
            position: 2,
            description: "Flue gas analysis".into(),
            quantity: 1,
            created_at: ts(2, 11),
        },
    ];

    let attachments = vec![Attachment {
        id: "att-1".into(),
        report_id: "report-1".into(),
        kind: "photo".into(),
        file_name: "photo_1.jpg".into(),
        relative_path: "report-1/photo_1.jpg".into(),
        size_bytes: 16,
        created_at: ts(2, 11),
    }];

    let spare_parts = vec![SparePart {
        id: "part-1".into(),
        report_id: "report-1".into(),
        code: "GSK-22".into(),
        description: "Gasket".into(),
        quantity: 2,
        created_at: ts(2, 11),
    }];

    let associations = vec![
        Association {
            id: "assoc-1".into(),
            report_id: "report-1".into(),
            site_unit_id: "unit-1".into(),
            created_at: ts(2, 8),
        },
        Association {
            id: "assoc-2".into(),
            report_id: "report-2".into(),
            site_unit_id: "unit-2".into(),
            created_at: ts(3, 8),
        },
    ];

    DatabaseAggregate {
        organizations,
        sites,
        site_units,
        contacts,
        reports,
        report_items,
        attachments,
        spare_parts,
        associations,
    }
}

/// Manifest of five photos spread across the two reports.
pub fn sample_photo_manifest() -> AssetManifest {
    let records = (1..=5)
        .map(|i| {
            let record_id = if i <= 3 { "report-1" } else { "report-2" };
            let body = photo_bytes(i);
            AssetRecord {
                record_id: record_id.into(),
                file_name: format!("photo_{i}.jpg"),
                relative_path: format!("{record_id}/photo_{i}.jpg"),
                size: body.len() as u64,
                sha256: sha256_hex(&body),
                has_thumbnail: false,
            }
        })
        .collect();
    AssetManifest::from_records(records, false)
}

pub fn sample_record() -> BackupRecord {
    let mut values = BTreeMap::new();
    values.insert("technician.name".to_string(), "Marco".to_string());
    values.insert("export.template".to_string(), "default".to_string());

    BackupRecord {
        metadata: BackupMetadata {
            id: "20240502-083000-abcdef01".into(),
            created_at: ts(2, 8),
            app_version: "2.3.1".into(),
            schema_version: 4,
            device: "tablet-07".into(),
            total_size: 0,
            checksum: String::new(),
        },
        database: sample_aggregate(),
        settings: SettingsSnapshot {
            values,
            created_at: ts(2, 8),
        },
        photo_manifest: sample_photo_manifest(),
        signature_manifest: AssetManifest::default(),
    }
}

/// Deterministic body of the i-th sample photo.
pub fn photo_bytes(i: usize) -> Vec<u8> {
    format!("JPEG-PHOTO-{i:04}").repeat(i).into_bytes()
}

/// Writes the five sample photos under `root` matching `sample_photo_manifest`.
pub fn write_sample_photos(root: &Path) {
    for record in sample_photo_manifest().records {
        let index: usize = record
            .file_name
            .trim_start_matches("photo_")
            .trim_end_matches(".jpg")
            .parse()
            .unwrap();
        let path = root.join(&record.relative_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, photo_bytes(index)).unwrap();
    }
}
