//! Fieldvault backup engine
//!
//! Snapshots a field-service datastore, its settings and its photo and
//! signature assets into a checksummed record plus zip archives, and restores
//! them.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod digest;
pub mod executor;
pub mod fs;
pub mod model;
pub mod progress;
pub mod serializer;
pub mod snapshot;
pub mod utils;
pub mod validator;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use archive::{AssetArchiver, Compression};
pub use catalog::{BackupCatalog, BackupEntry};
pub use config::Config;
pub use executor::{BackupOrchestrator, BackupProgress, RestoreCoordinator, RestorePhase, RestoreProgress};
pub use model::BackupRecord;
pub use snapshot::{DatabaseSnapshotter, RestoreStrategy, SettingsStore, TableStore, TableWriter};
pub use utils::errors::{BackupError, Result};
pub use validator::{IntegrityValidator, ValidationLimits, ValidationReport};
