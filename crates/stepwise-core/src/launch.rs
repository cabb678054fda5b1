//! Generic launch options, translated per backend by adapter factories

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Backend-independent launch options supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchOptions {
    pub stop_on_entry: bool,
    /// Only step through user code (backends that support it)
    pub just_my_code: Option<bool>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Extra backend-specific keys merged into the launch arguments verbatim
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fully resolved launch request handed to `transform_launch_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub options: LaunchOptions,
}

impl LaunchConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            options: LaunchOptions::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_options(mut self, options: LaunchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn program_display(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Working directory: explicit option, else the program's parent
    pub fn working_dir(&self) -> Option<PathBuf> {
        self.options
            .cwd
            .clone()
            .or_else(|| self.program.parent().filter(|p| !p.as_os_str().is_empty()).map(|p| p.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_dir_defaults_to_program_parent() {
        let launch = LaunchConfig::new("/work/app/main.py");
        assert_eq!(launch.working_dir(), Some(PathBuf::from("/work/app")));

        let bare = LaunchConfig::new("main.py");
        assert_eq!(bare.working_dir(), None);

        let explicit = LaunchConfig::new("/work/app/main.py").with_options(LaunchOptions {
            cwd: Some(PathBuf::from("/tmp")),
            ..Default::default()
        });
        assert_eq!(explicit.working_dir(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: LaunchOptions = serde_json::from_str(r#"{"stopOnEntry": true}"#).unwrap();
        assert!(opts.stop_on_entry);
        assert!(opts.env.is_empty());
    }
}
