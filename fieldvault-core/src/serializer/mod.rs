//! Canonical encoding of backup records.
//!
//! Records are pretty-printed JSON with camelCase keys and ordered maps, so
//! the same record always encodes to the same bytes. The checksum is the
//! SHA-256 of that encoding with `checksum` and `totalSize` zeroed.

pub mod iso8601;
pub mod lenient;

use crate::digest::sha256_hex;
use crate::model::BackupRecord;
use crate::utils::errors::{BackupError, Result};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Encode a record as pretty-printed JSON.
pub fn encode(record: &BackupRecord) -> Result<String> {
    serde_json::to_string_pretty(record).map_err(|e| BackupError::Serialization(e.to_string()))
}

/// Decode a record. Unknown keys are ignored and malformed scalars are
/// coerced; a missing required top-level field fails the decode.
pub fn decode(text: &str) -> Result<BackupRecord> {
    serde_json::from_str(text).map_err(|e| BackupError::Serialization(e.to_string()))
}

/// Decode a record from an already-parsed JSON tree.
pub fn decode_value(value: Value) -> Result<BackupRecord> {
    serde_json::from_value(value).map_err(|e| BackupError::Serialization(e.to_string()))
}

/// Canonical bytes the checksum is computed over.
pub fn canonical_bytes(record: &BackupRecord) -> Result<Vec<u8>> {
    let mut canonical = record.clone();
    canonical.metadata.checksum.clear();
    canonical.metadata.total_size = 0;
    Ok(encode(&canonical)?.into_bytes())
}

pub fn compute_checksum(record: &BackupRecord) -> Result<String> {
    Ok(sha256_hex(&canonical_bytes(record)?))
}

/// True when the stored checksum matches a fresh computation.
pub fn verify_checksum(record: &BackupRecord) -> bool {
    match compute_checksum(record) {
        Ok(checksum) => checksum == record.metadata.checksum,
        Err(_) => false,
    }
}

/// Compute and store the checksum.
pub fn seal(record: &mut BackupRecord) -> Result<()> {
    record.metadata.checksum = compute_checksum(record)?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<BackupRecord> {
    let text = fs::read_to_string(path).map_err(|e| BackupError::storage(path, e))?;
    decode(&text)
}

/// Write a record through a temporary sibling, renamed into place once synced.
/// Returns the number of bytes written.
pub fn write_file(path: &Path, record: &BackupRecord) -> Result<u64> {
    let text = encode(record)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = fs::File::create(&tmp_path).map_err(|e| BackupError::storage(&tmp_path, e))?;
    file.write_all(text.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| BackupError::storage(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| BackupError::storage(path, e))?;
    Ok(text.len() as u64)
}
