//! JavaScript via js-debug's standalone DAP server
//! (`node dapDebugServer.js <port> <host>`), reached over TCP.

use super::{
    base_launch_arguments, merge_extra, query_version, AdapterCommand, AdapterCommandConfig,
    AdapterFactory, AdapterMetadata, EnvironmentReport,
};
use crate::policy::{BackendPolicy, JavaScriptPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use stepwise_core::{DebugLanguage, LaunchConfig};

/// Overrides the location of `dapDebugServer.js`
pub const JS_DEBUG_SERVER_ENV: &str = "STEPWISE_JS_DEBUG_SERVER";

const SERVER_SCRIPT: &str = "dapDebugServer.js";

#[derive(Debug, Default)]
pub struct JavaScriptAdapterFactory {
    server_script: Option<PathBuf>,
}

impl JavaScriptAdapterFactory {
    pub fn new() -> Self {
        Self {
            server_script: std::env::var_os(JS_DEBUG_SERVER_ENV).map(PathBuf::from),
        }
    }

    pub fn with_server_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_script = Some(path.into());
        self
    }

    /// Explicit script, else the first well-known install location
    fn find_server_script(&self) -> Option<PathBuf> {
        if let Some(script) = &self.server_script {
            return Some(script.clone());
        }
        let mut candidates = Vec::new();
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            candidates.push(home.join(".stepwise/js-debug/src").join(SERVER_SCRIPT));
            candidates.push(home.join(".local/share/js-debug/src").join(SERVER_SCRIPT));
        }
        candidates.push(PathBuf::from("/usr/local/lib/js-debug/src").join(SERVER_SCRIPT));
        candidates.into_iter().find(|path| path.is_file())
    }
}

#[async_trait]
impl AdapterFactory for JavaScriptAdapterFactory {
    fn language(&self) -> DebugLanguage {
        DebugLanguage::JavaScript
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            language: DebugLanguage::JavaScript,
            display_name: "JavaScript (js-debug)".to_string(),
            adapter_name: "js-debug".to_string(),
            description: "Node.js debugging through the js-debug DAP server".to_string(),
            install_guidance: format!(
                "Install Node.js and download js-debug-dap from https://github.com/microsoft/vscode-js-debug/releases, then set {} to its src/{}",
                JS_DEBUG_SERVER_ENV, SERVER_SCRIPT
            ),
            documentation_url: Some("https://github.com/microsoft/vscode-js-debug".to_string()),
        }
    }

    async fn validate_environment(&self) -> EnvironmentReport {
        let mut report = EnvironmentReport::default();
        match self.resolve_executable(None).await {
            Ok(node) => {
                report.version = query_version(&node, &["--version"]).await;
                report.executable = Some(node);
            }
            Err(_) => report.error("node not found on PATH. Install Node.js 18+"),
        }
        match self.find_server_script() {
            Some(script) if script.is_file() => {}
            Some(script) => report.error(format!(
                "js-debug server script {} does not exist",
                script.display()
            )),
            None => report.error(format!(
                "js-debug not found. {}",
                self.metadata().install_guidance
            )),
        }
        report
    }

    fn default_executable_name(&self) -> &'static str {
        "node"
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand> {
        let script = self
            .find_server_script()
            .ok_or_else(|| Error::AdapterNotInstalled {
                language: DebugLanguage::JavaScript.to_string(),
                guidance: self.metadata().install_guidance,
            })?;
        Ok(
            AdapterCommand::new(config.executable.to_string_lossy().to_string()).with_args([
                script.to_string_lossy().to_string(),
                config.port.to_string(),
                config.host.clone(),
            ]),
        )
    }

    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value> {
        let mut args = base_launch_arguments(launch);
        args.insert("type".into(), "pwa-node".into());
        args.insert("request".into(), "launch".into());
        args.insert("console".into(), "internalConsole".into());
        args.insert("outputCapture".into(), "std".into());
        if launch.options.just_my_code.unwrap_or(true) {
            args.insert("skipFiles".into(), serde_json::json!(["<node_internals>/**"]));
        }
        Ok(merge_extra(args, launch))
    }

    fn policy(&self) -> Arc<dyn BackendPolicy> {
        Arc::new(JavaScriptPolicy)
    }
}
