//! Filesystem helpers for config and log paths

use crate::constants::DEFAULT_CONFIG_FILENAME;
use std::path::{Path, PathBuf};

/// Create the parent directory of `path` if it is missing.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// `stepwise.toml` in the current directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILENAME)
}
