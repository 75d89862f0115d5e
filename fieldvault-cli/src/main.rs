mod commands;
mod config;
mod db;
mod models;
mod store;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use fieldvault_core::RestoreStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fieldvault", version, about = "Back up and restore the field-service datastore")]
struct Cli {
    /// SQLite database file (overrides FIELDVAULT_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Engine configuration file (overrides FIELDVAULT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides LOG_LEVEL and the config file)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a backup of the database, settings and assets
    Create {
        /// Leave photos out of the backup
        #[arg(long)]
        no_photos: bool,
        /// Leave photo thumbnails out of the backup
        #[arg(long)]
        no_thumbnails: bool,
    },
    /// Replace the database and assets with the contents of a backup
    Restore {
        record: PathBuf,
        #[arg(long, default_value = "replace-all")]
        strategy: RestoreStrategy,
    },
    /// Fully validate one or more backup records
    Validate {
        #[arg(required = true)]
        records: Vec<PathBuf>,
    },
    /// Quick structural check of a backup record
    Check { record: PathBuf },
    /// List backups, newest first
    List,
    /// Delete old backups
    Prune {
        /// Number of valid backups to keep (default from config)
        #[arg(long)]
        keep: Option<usize>,
        /// Also delete backups whose record is missing or unreadable
        #[arg(long)]
        incomplete: bool,
    },
    /// Show schema version, row count and referential integrity of the database
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app = AppConfig::from_env();
    if let Some(db) = cli.db {
        app.db_path = db;
    }
    if let Some(path) = cli.config {
        app.config_path = Some(path);
    }
    if let Some(level) = cli.log_level {
        app.log_level = Some(level);
    }

    let mut config = app.engine_config()?;
    fieldvault_core::utils::logger::init(&config.log.level)?;
    tracing::debug!("Using database {}", app.db_path.display());

    match cli.command {
        Command::Create { no_photos, no_thumbnails } => {
            if no_photos {
                config.assets.include_photos = false;
            }
            if no_thumbnails {
                config.assets.include_thumbnails = false;
            }
            commands::create(&app, config, cli.json).await
        }
        Command::Restore { record, strategy } => {
            commands::restore(&app, config, &record, strategy, cli.json).await
        }
        Command::Validate { records } => commands::validate(&config, &records, cli.json),
        Command::Check { record } => commands::check(&config, &record),
        Command::List => commands::list(&config, cli.json),
        Command::Prune { keep, incomplete } => commands::prune(&config, keep, incomplete),
        Command::Status => commands::status(&app, cli.json),
    }
}
