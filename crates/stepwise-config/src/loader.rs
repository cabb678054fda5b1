//! Configuration file loading and validation
//!
//! - [`load_config`] - strict loader, errors if the file is missing
//! - [`load_config_or_default`] - defaults when the file is missing
//! - [`load_config_from_str`] - parse and validate TOML text

use crate::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors that can occur during config loading
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file. No side effects; a missing file is
/// `ConfigError::NotFound`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Like [`load_config`] but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load_config(path) {
        Err(ConfigError::NotFound(_)) => {
            debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Config::default())
        }
        other => other,
    }
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Render a config as TOML
pub fn to_toml_string(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Validate configuration values, reporting every violation at once.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut all_errors = Vec::new();

    all_errors.extend(config.adapter.validate());
    all_errors.extend(config.session.validate());
    all_errors.extend(config.logging.validate());

    // A step wait longer than the request timeout can never complete.
    if config.session.step_timeout_ms > config.adapter.request_timeout_ms {
        all_errors.push(format!(
            "session.step_timeout_ms ({}) must be <= adapter.request_timeout_ms ({})",
            config.session.step_timeout_ms, config.adapter.request_timeout_ms
        ));
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(all_errors.join("; ")))
    }
}
