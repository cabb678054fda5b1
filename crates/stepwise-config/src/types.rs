//! Top-level configuration document

use crate::adapter::AdapterConnectionConfig;
use crate::constants::DEFAULT_LOG_LEVEL;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Contents of `stepwise.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub adapter: AdapterConnectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub show_target: bool,
    /// UTC timestamps instead of local time
    #[serde(default)]
    pub utc: bool,
    /// Log to this file (daily rotation) instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_target: false,
            utc: false,
            file: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let level = self.level.to_lowercase();
        // Directive strings such as "stepwise_dap=trace,info" are accepted as-is.
        if !level.contains('=') && !LOG_LEVELS.contains(&level.as_str()) {
            return vec![format!(
                "logging.level '{}' is not one of {}",
                self.level,
                LOG_LEVELS.join(", ")
            )];
        }
        Vec::new()
    }
}
