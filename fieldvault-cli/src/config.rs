use fieldvault_core::Config;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            db_path: PathBuf::from(
                std::env::var("FIELDVAULT_DB").unwrap_or_else(|_| "fieldvault.db".into()),
            ),
            config_path: std::env::var("FIELDVAULT_CONFIG").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").ok(),
        }
    }

    /// Engine configuration from the TOML file, if any. `LOG_LEVEL` overrides
    /// the file's `[log] level`.
    pub fn engine_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(level) = self.log_level.as_ref().filter(|l| !l.trim().is_empty()) {
            config.log.level = level.clone();
        }
        Ok(config)
    }
}
