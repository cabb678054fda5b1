//! CLI context - configuration shared by every command
//!
//! Created once at startup and passed to each command.

use std::path::PathBuf;
use std::sync::Arc;
use stepwise_config::{load_config, load_config_or_default, paths::default_config_path, Config};

#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: Arc<Config>,
    /// Path the config was read from, or would be read from
    pub config_path: PathBuf,
    /// Where the path came from: "explicit path" or "default"
    pub config_source: &'static str,
}

impl CliContext {
    /// Load `stepwise.toml` from the working directory; defaults when absent
    pub fn new() -> Result<Self, CliContextError> {
        let config_path = default_config_path();
        let config =
            load_config_or_default(&config_path).map_err(|e| CliContextError::ConfigLoad {
                path: config_path.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            config: Arc::new(config),
            config_path,
            config_source: "default",
        })
    }

    /// Load an explicitly named config. A missing file is an error.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, CliContextError> {
        let config = load_config(&config_path).map_err(|e| CliContextError::ConfigLoad {
            path: config_path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            config: Arc::new(config),
            config_path,
            config_source: "explicit path",
        })
    }

    /// `--config` / `STEPWISE_CONFIG` when given, otherwise the default
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, CliContextError> {
        match config_path {
            Some(path) => Self::with_config_path(path),
            None => Self::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliContextError {
    #[error("Failed to load config from {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },
}
