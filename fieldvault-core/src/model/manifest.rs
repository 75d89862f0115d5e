//! Asset manifest types.
//!
//! A manifest inventories every file in a photo or signature archive with its
//! size and SHA-256 digest, so archives can be verified independently of the
//! record that references them.

use crate::serializer::lenient;
use serde::{Deserialize, Serialize};

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Which asset archive a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Photo,
    Signature,
}

impl AssetKind {
    /// File name of the archive inside a backup directory.
    pub fn archive_name(&self) -> &'static str {
        match self {
            AssetKind::Photo => "photos.zip",
            AssetKind::Signature => "signatures.zip",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Photo => "photo",
            AssetKind::Signature => "signature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Id of the report (or other record) owning the file.
    #[serde(default, deserialize_with = "lenient::string")]
    pub record_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_name: String,
    /// Path inside the archive, `/`-separated.
    #[serde(default, deserialize_with = "lenient::string")]
    pub relative_path: String,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub sha256: String,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub has_thumbnail: bool,
}

impl AssetRecord {
    pub fn has_valid_digest(&self) -> bool {
        is_hex_digest(&self.sha256)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    #[serde(default, deserialize_with = "lenient::u64")]
    pub total_count: u64,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub total_size: u64,
    #[serde(default)]
    pub records: Vec<AssetRecord>,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub includes_thumbnails: bool,
}

impl AssetManifest {
    /// Build a manifest whose totals agree with `records`.
    pub fn from_records(records: Vec<AssetRecord>, includes_thumbnails: bool) -> Self {
        Self {
            total_count: records.len() as u64,
            total_size: records.iter().map(|r| r.size).sum(),
            records,
            includes_thumbnails,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0 && self.records.is_empty()
    }

    pub fn count_matches(&self) -> bool {
        self.total_count == self.records.len() as u64
    }
}

/// True when `digest` is exactly 64 hex characters.
pub fn is_hex_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_records_totals() {
        let records = vec![
            AssetRecord { size: 10, ..Default::default() },
            AssetRecord { size: 32, ..Default::default() },
        ];
        let manifest = AssetManifest::from_records(records, false);
        assert_eq!(manifest.total_count, 2);
        assert_eq!(manifest.total_size, 42);
        assert!(manifest.count_matches());
        assert!(!manifest.is_empty());
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = AssetManifest::default();
        assert!(manifest.is_empty());
        assert!(manifest.count_matches());
    }

    #[test]
    fn test_is_hex_digest() {
        assert!(is_hex_digest(&"a".repeat(64)));
        assert!(is_hex_digest(&"0123456789abcdef".repeat(4)));
        assert!(!is_hex_digest(&"a".repeat(63)));
        assert!(!is_hex_digest(&"g".repeat(64)));
        assert!(!is_hex_digest(""));
    }

    #[test]
    fn test_archive_names() {
        assert_eq!(AssetKind::Photo.archive_name(), "photos.zip");
        assert_eq!(AssetKind::Signature.archive_name(), "signatures.zip");
    }
}
