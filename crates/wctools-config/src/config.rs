//! Configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;
use wctools_db::{RegistryError, SchemaRegistry, StoreError, StoreOptions};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Table definitions. Empty means the built-in registry.
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Drop every existing table when the store is opened.
    #[serde(default = "default_wipe_on_init")]
    pub wipe_on_init: bool,

    /// Busy timeout for each connection, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "wctools_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// One `[[tables]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// The `CREATE TABLE` statement.
    pub definition: String,
}

fn default_db_path() -> String {
    "wctools.db".to_string()
}

fn default_wipe_on_init() -> bool {
    StoreOptions::default().wipe_on_init
}

fn default_busy_timeout_ms() -> u64 {
    StoreOptions::default().busy_timeout_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wipe_on_init: default_wipe_on_init(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Builds the schema registry from `[[tables]]`, or the built-in one
    /// when none are configured.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` for duplicate, blank or malformed entries, or
    /// a definition that creates a table under another name.
    pub fn registry(&self) -> Result<SchemaRegistry, RegistryError> {
        if self.tables.is_empty() {
            return Ok(SchemaRegistry::default());
        }
        SchemaRegistry::new(
            self.tables
                .iter()
                .map(|t| (t.name.as_str(), t.definition.as_str())),
        )
    }

    /// Store options derived from the `[database]` section.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            wipe_on_init: self.database.wipe_on_init,
            busy_timeout_ms: self.database.busy_timeout_ms,
        }
    }
}

/// Errors that can occur when loading configuration or opening the store
/// it describes.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configured tables do not form a valid registry.
    #[error("invalid table configuration: {0}")]
    Registry(#[from] RegistryError),

    /// The store could not be opened.
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WCTOOLS_DB_PATH` overrides `database.path`
/// - `WCTOOLS_WIPE_ON_INIT` overrides `database.wipe_on_init` ("true"/"1" or "false"/"0")
/// - `WCTOOLS_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `WCTOOLS_LOG_LEVEL` overrides `logging.level`
/// - `WCTOOLS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parses configuration from TOML text without consulting the environment.
///
/// # Errors
///
/// Returns `ConfigError::Parse` on malformed TOML or mistyped values.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Applies overrides from `lookup`, which maps variable names to values.
///
/// Unparseable numeric or boolean values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = lookup("WCTOOLS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(wipe) = lookup("WCTOOLS_WIPE_ON_INIT").as_deref().and_then(parse_flag) {
        config.database.wipe_on_init = wipe;
    }
    if let Some(timeout) = lookup("WCTOOLS_BUSY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.busy_timeout_ms = parsed;
        }
    }
    if let Some(level) = lookup("WCTOOLS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("WCTOOLS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
