//! Go via Delve's DAP server. `dlv dap --client-addr` dials back to a
//! listener we own.

use super::{
    base_launch_arguments, merge_extra, query_version, AdapterCommand, AdapterCommandConfig,
    AdapterFactory, AdapterMetadata, EnvironmentReport,
};
use crate::policy::{BackendPolicy, GoPolicy};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_core::{DebugLanguage, LaunchConfig};

#[derive(Debug, Default)]
pub struct GoAdapterFactory;

impl GoAdapterFactory {
    pub fn new() -> Self {
        Self
    }
}

/// Source (`debug`) or prebuilt binary (`exec`)
fn delve_mode(program: &Path) -> &'static str {
    if program.is_dir() || program.extension().is_some_and(|ext| ext == "go") {
        "debug"
    } else {
        "exec"
    }
}

#[async_trait]
impl AdapterFactory for GoAdapterFactory {
    fn language(&self) -> DebugLanguage {
        DebugLanguage::Go
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            language: DebugLanguage::Go,
            display_name: "Go (Delve)".to_string(),
            adapter_name: "delve".to_string(),
            description: "Go debugging through Delve's DAP server".to_string(),
            install_guidance: "Install Delve: go install github.com/go-delve/delve/cmd/dlv@latest"
                .to_string(),
            documentation_url: Some(
                "https://github.com/go-delve/delve/tree/master/Documentation/installation"
                    .to_string(),
            ),
        }
    }

    async fn validate_environment(&self) -> EnvironmentReport {
        let mut report = EnvironmentReport::default();
        match self.resolve_executable(None).await {
            Ok(dlv) => {
                report.version = query_version(&dlv, &["version"]).await;
                if report.version.is_none() {
                    report.warning("Could not determine the Delve version");
                }
                report.executable = Some(dlv);
            }
            Err(_) => report.error(format!(
                "dlv not found on PATH or in GOPATH/bin. {}",
                self.metadata().install_guidance
            )),
        }
        if which::which("go").is_err() {
            report.warning("go toolchain not found; only prebuilt binaries can be debugged");
        }
        report
    }

    fn default_executable_name(&self) -> &'static str {
        "dlv"
    }

    fn executable_search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(gopath) = std::env::var_os("GOPATH") {
            paths.push(PathBuf::from(gopath).join("bin"));
        }
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(home).join("go").join("bin"));
        }
        paths
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand> {
        Ok(
            AdapterCommand::new(config.executable.to_string_lossy().to_string()).with_args([
                "dap".to_string(),
                "--client-addr".to_string(),
                format!("{}:{}", config.host, config.port),
            ]),
        )
    }

    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value> {
        let mut args = base_launch_arguments(launch);
        args.insert("type".into(), "go".into());
        args.insert("request".into(), "launch".into());
        args.insert("mode".into(), delve_mode(&launch.program).into());
        Ok(merge_extra(args, launch))
    }

    fn policy(&self) -> Arc<dyn BackendPolicy> {
        Arc::new(GoPolicy)
    }
}
