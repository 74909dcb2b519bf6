use crate::config::types::{
    Config, DispatcherConfig, SeedEntry, StorageConfig, TelemetryConfig, WorkersConfig,
};
use crate::url::canonicalize_url;
use crate::ConfigError;

/// Upper bound on the number of workers in one pool
pub const MAX_WORKERS: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_dispatcher_config(&config.dispatcher)?;
    validate_workers_config(&config.workers)?;
    validate_telemetry_config(&config.telemetry)?;
    validate_seeds(&config.seed)?;
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_dispatcher_config(config: &DispatcherConfig) -> Result<(), ConfigError> {
    if config.cooldown_secs == 0 {
        return Err(ConfigError::Validation(
            "cooldown_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates worker pool configuration
fn validate_workers_config(config: &WorkersConfig) -> Result<(), ConfigError> {
    if config.count < 1 || config.count > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers.count must be between 1 and {}, got {}",
            MAX_WORKERS, config.count
        )));
    }

    if config.processing_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "processing_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.idle_poll_ms == 0 {
        return Err(ConfigError::Validation(
            "idle_poll_ms must be >= 1 (an idle worker must not busy-spin)".to_string(),
        ));
    }

    Ok(())
}

fn validate_telemetry_config(config: &TelemetryConfig) -> Result<(), ConfigError> {
    if config.step_window == 0 {
        return Err(ConfigError::Validation(
            "step_window must be >= 1".to_string(),
        ));
    }

    if config.recent_timings == 0 {
        return Err(ConfigError::Validation(
            "recent_timings must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates seed URLs
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        canonicalize_url(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;
    }
    Ok(())
}
