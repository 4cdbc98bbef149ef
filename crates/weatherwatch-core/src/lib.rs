pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, LoggingConfig, SearchConfig, StorageConfig, TemperatureUnit,
    ValidationResult, WeatherConfig,
};
pub use error::{AppError, ConfigError, StorageError};

use anyhow::Result;

/// Initialize logging with the default `info` filter.
pub fn init() -> Result<()> {
    init_with_level("info")
}

/// Initialize logging. `RUST_LOG` takes precedence over `level`.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_with_level(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
    {
        tracing::info!("Weather Watch core initialized");
    }
    Ok(())
}
