//! Process configuration loaded from a TOML file.
//!
//! Only the process entry point reads this. Runtime switches that the ledger
//! consults per operation (period lock, negative earmarks) live in the
//! `settings` table instead, see [`crate::core::settings`].

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// sea-orm connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Directory the attachment store writes into
    #[serde(default = "default_attachments_dir")]
    pub attachments_dir: PathBuf,
    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_database_url() -> String {
    super::database::DEFAULT_DATABASE_URL.to_string()
}

fn default_attachments_dir() -> PathBuf {
    PathBuf::from("data/attachments")
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            attachments_dir: default_attachments_dir(),
            log_filter: default_log_filter(),
        }
    }
}

/// Loads the configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Parses configuration text; missing keys fall back to defaults.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Resolves the configuration the way the binary does: the file named by
/// `LEDGER_CONFIG` (default `config.toml`) if it exists, then `DATABASE_URL`
/// from the environment on top.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = if Path::new(&path).exists() {
        load_config(&path)?
    } else {
        tracing::info!("No configuration file at {path}, using defaults");
        AppConfig::default()
    };

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = url;
    }
    Ok(config)
}
