//! The backup record and everything it embeds.

pub mod entities;
pub mod manifest;

pub use entities::*;
pub use manifest::{is_hex_digest, AssetKind, AssetManifest, AssetRecord, DIGEST_HEX_LEN};

use crate::serializer::{iso8601, lenient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level keys a record must carry to be decodable.
pub const REQUIRED_FIELDS: [&str; 4] = ["metadata", "database", "settings", "photoManifest"];

/// Root artifact of a backup, serialized as `backup-<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub metadata: BackupMetadata,
    pub database: DatabaseAggregate,
    pub settings: SettingsSnapshot,
    pub photo_manifest: AssetManifest,
    #[serde(default)]
    pub signature_manifest: AssetManifest,
}

impl BackupRecord {
    pub fn manifest(&self, kind: AssetKind) -> &AssetManifest {
        match kind {
            AssetKind::Photo => &self.photo_manifest,
            AssetKind::Signature => &self.signature_manifest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub app_version: String,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub schema_version: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub device: String,
    /// Declared size of the record plus its archives, in bytes.
    #[serde(default, deserialize_with = "lenient::u64")]
    pub total_size: u64,
    /// Lowercase hex SHA-256 of the canonical encoding; empty until sealed.
    #[serde(default, deserialize_with = "lenient::string")]
    pub checksum: String,
}

/// Free-form key/value settings at the time of the backup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    #[serde(default, deserialize_with = "lenient::string_map")]
    pub values: BTreeMap<String, String>,
    #[serde(default, with = "iso8601")]
    pub created_at: DateTime<Utc>,
}
