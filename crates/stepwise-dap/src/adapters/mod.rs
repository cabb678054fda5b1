//! Adapter factories
//!
//! One [`AdapterFactory`] per language knows how to find the debug adapter on
//! this machine, how to start it, and how to turn a generic [`LaunchConfig`]
//! into the launch arguments that adapter understands. The protocol quirks of
//! the running adapter are the [`BackendPolicy`]'s job.

mod go;
mod javascript;
mod python;
mod rust;

pub use go::GoAdapterFactory;
pub use javascript::JavaScriptAdapterFactory;
pub use python::PythonAdapterFactory;
pub use rust::{RustAdapterFactory, RUST_LLDB_TYPE_FORMATTERS};

use crate::constants::requests;
use crate::policy::BackendPolicy;
use crate::{Capabilities, Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::{DebugLanguage, LaunchConfig};
use tracing::debug;

/// Upper bound for `--version` style queries
const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Static description of an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterMetadata {
    pub language: DebugLanguage,
    pub display_name: String,
    /// Name of the debug adapter implementation (`debugpy`, `delve`, ...)
    pub adapter_name: String,
    pub description: String,
    /// How to install the adapter when it is missing
    pub install_guidance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

/// Result of checking whether an adapter can run here
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl EnvironmentReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Inputs for building the adapter command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCommandConfig {
    /// Resolved adapter (or runtime) executable
    pub executable: PathBuf,
    pub host: String,
    /// Port allocated for TCP transports
    pub port: u16,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl AdapterCommandConfig {
    pub fn new(executable: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            executable: executable.into(),
            host: host.into(),
            port,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }
}

/// Command line that starts the adapter process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCommand {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl AdapterCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Creates and describes the debug adapter for one language
#[async_trait]
pub trait AdapterFactory: Send + Sync + std::fmt::Debug {
    fn language(&self) -> DebugLanguage;

    fn metadata(&self) -> AdapterMetadata;

    /// Check that the adapter and its runtime are installed. Never fails;
    /// problems are reported in the returned report.
    async fn validate_environment(&self) -> EnvironmentReport;

    fn default_executable_name(&self) -> &'static str;

    /// Extra directories searched after `PATH`
    fn executable_search_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Preferred path if given, else `PATH`, else the search paths
    async fn resolve_executable(&self, preferred: Option<&Path>) -> Result<PathBuf> {
        if let Some(preferred) = preferred {
            if preferred.is_file() {
                return Ok(preferred.to_path_buf());
            }
            if let Ok(found) = which::which(preferred) {
                return Ok(found);
            }
            return Err(Error::ExecutableNotFound(preferred.display().to_string()));
        }

        let name = self.default_executable_name();
        if let Ok(found) = which::which(name) {
            return Ok(found);
        }
        self.executable_search_paths()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::ExecutableNotFound(name.to_string()))
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand>;

    /// Backend launch arguments for a generic launch request
    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value>;

    /// Capabilities the adapter is expected to report
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_configuration_done_request: Some(true),
            supports_conditional_breakpoints: Some(true),
            ..Default::default()
        }
    }

    fn policy(&self) -> Arc<dyn BackendPolicy>;

    /// `launch` or `attach`
    fn launch_request(&self) -> &'static str {
        requests::LAUNCH
    }
}

/// Run `executable args...` and return the first non-empty output line
pub(crate) async fn query_version(executable: &Path, args: &[&str]) -> Option<String> {
    let mut command = tokio::process::Command::new(executable);
    command.args(args).kill_on_drop(true);
    let output = match tokio::time::timeout(VERSION_QUERY_TIMEOUT, command.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(
                "'{}' exited with {} during version query",
                executable.display(),
                output.status
            );
            return None;
        }
        Ok(Err(e)) => {
            debug!("Version query of '{}' failed: {}", executable.display(), e);
            return None;
        }
        Err(_) => return None,
    };
    // Some tools print their version on stderr
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Launch arguments shared by every backend: program, args, cwd, env,
/// stopOnEntry, then the caller's extra keys
pub(crate) fn base_launch_arguments(launch: &LaunchConfig) -> serde_json::Map<String, serde_json::Value> {
    let mut args = serde_json::Map::new();
    args.insert("program".into(), launch.program_display().into());
    args.insert("args".into(), launch.args.clone().into());
    if let Some(cwd) = launch.working_dir() {
        args.insert("cwd".into(), cwd.to_string_lossy().to_string().into());
    }
    if !launch.options.env.is_empty() {
        args.insert(
            "env".into(),
            serde_json::to_value(&launch.options.env).unwrap_or_default(),
        );
    }
    args.insert("stopOnEntry".into(), launch.options.stop_on_entry.into());
    args
}

pub(crate) fn merge_extra(
    mut args: serde_json::Map<String, serde_json::Value>,
    launch: &LaunchConfig,
) -> serde_json::Value {
    for (key, value) in &launch.options.extra {
        args.insert(key.clone(), value.clone());
    }
    serde_json::Value::Object(args)
}

/// Builtin factory for a language, if one exists
pub fn builtin_factory(language: DebugLanguage) -> Option<Arc<dyn AdapterFactory>> {
    match language {
        DebugLanguage::Python => Some(Arc::new(PythonAdapterFactory::new())),
        DebugLanguage::Go => Some(Arc::new(GoAdapterFactory::new())),
        DebugLanguage::Rust => Some(Arc::new(RustAdapterFactory::new())),
        DebugLanguage::JavaScript => Some(Arc::new(JavaScriptAdapterFactory::new())),
        DebugLanguage::Mock => None,
    }
}
