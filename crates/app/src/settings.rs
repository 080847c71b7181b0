//! Handles settings for the application. Configuration is read from
//! `config/bursar.toml` (optional) and `BURSAR__*` environment variables,
//! e.g. `BURSAR__SERVER__PORT=8080`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/bursar";

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Ledger {
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            conflict_retries: default_conflict_retries(),
        }
    }
}

fn default_conflict_retries() -> u32 {
    engine::DEFAULT_CONFLICT_RETRIES
}

/// Administrator created at startup when missing.
#[derive(Debug, Deserialize)]
pub struct Admin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Server,
    #[serde(default)]
    pub ledger: Ledger,
    pub admin: Option<Admin>,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BURSAR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
