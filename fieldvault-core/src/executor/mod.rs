//! End-to-end pipelines: backup creation and restore.

pub mod backup;
pub mod restore;

pub use backup::{BackupOrchestrator, BackupProgress, BackupSummary, BackupTask};
pub use restore::{RestoreCoordinator, RestorePhase, RestoreProgress, RestoreTask};
