//! TOML loading and config fingerprinting

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates the configuration file at `path`
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use crawl_queue::config::load_config;
///
/// let config = load_config(Path::new("crawl-queue.toml")).unwrap();
/// println!("Database: {}", config.storage.database_path);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Parses and validates configuration text
///
/// Missing sections and keys take their defaults, so `""` is a valid
/// configuration.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of the configuration file
///
/// Logged at startup so a run can be matched to the configuration it used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read_to_string(path)?))
}

/// Loads a configuration and returns it with the hash of the same bytes
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
