//! Configuration and logging for wctools.
//!
//! Loads the TOML configuration (with `WCTOOLS_*` environment overrides),
//! installs the `tracing` subscriber, and opens the [`SchemaStore`] the
//! configuration describes.
//!
//! ```rust,no_run
//! let config = wctools_config::load_config(Some("wctools.toml"))?;
//! wctools_config::init_logging(&config.logging);
//! let store = wctools_config::open_store(&config)?;
//! # Ok::<(), wctools_config::ConfigError>(())
//! ```

mod config;
mod logging;

pub use config::{
    apply_env_overrides, load_config, parse_config, Config, ConfigError, DatabaseConfig,
    LoggingConfig, TableConfig,
};
pub use logging::init_logging;

use wctools_db::SchemaStore;

/// Opens the store described by `config`.
///
/// # Errors
///
/// Returns `ConfigError::Registry` if the configured tables are invalid and
/// `ConfigError::Store` if the store cannot be opened or initialized.
pub fn open_store(config: &Config) -> Result<SchemaStore, ConfigError> {
    let registry = config.registry()?;
    tracing::info!(
        path = %config.database.path,
        tables = registry.len(),
        wipe_on_init = config.database.wipe_on_init,
        "opening schema store"
    );
    Ok(SchemaStore::open(
        &config.database.path,
        registry,
        config.store_options(),
    )?)
}
