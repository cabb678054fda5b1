//! Rust via lldb-dap over stdio

use super::{
    base_launch_arguments, merge_extra, query_version, AdapterCommand, AdapterCommandConfig,
    AdapterFactory, AdapterMetadata, EnvironmentReport,
};
use crate::policy::{BackendPolicy, RustPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use stepwise_core::{DebugLanguage, LaunchConfig};

/// LLDB type summaries for common std types, sent as `initCommands`.
/// Without them LLDB prints raw struct internals for String, Vec and friends.
pub const RUST_LLDB_TYPE_FORMATTERS: &[&str] = &[
    r#"type summary add -x "^alloc::([a-z_]+::)*String$" --summary-string "${var.vec.buf.inner.ptr.pointer.pointer%s}""#,
    r#"type summary add -x "^&str$" --summary-string "${var.data_ptr%s}""#,
    r#"type summary add -x "^alloc::([a-z_]+::)*Vec<.+>$" --summary-string "len=${var.len}, cap=${var.buf.inner.cap}""#,
    r#"type summary add -x "^core::option::Option<.+>$" --summary-string "${var}""#,
    r#"type summary add -x "^core::result::Result<.+>$" --summary-string "${var}""#,
    r#"type summary add -x "^alloc::([a-z_]+::)*Box<.+>$" --summary-string "${*var.inner.pointer.pointer}""#,
    r#"type summary add -x "^alloc::([a-z_]+::)*Rc<.+>$" --summary-string "${*var.inner.pointer.pointer}""#,
    r#"type summary add -x "^alloc::([a-z_]+::)*Arc<.+>$" --summary-string "${*var.inner.pointer.pointer}""#,
];

#[derive(Debug, Default)]
pub struct RustAdapterFactory;

impl RustAdapterFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AdapterFactory for RustAdapterFactory {
    fn language(&self) -> DebugLanguage {
        DebugLanguage::Rust
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            language: DebugLanguage::Rust,
            display_name: "Rust (lldb-dap)".to_string(),
            adapter_name: "lldb-dap".to_string(),
            description: "Native debugging of compiled Rust binaries through lldb-dap".to_string(),
            install_guidance:
                "Install LLVM with lldb-dap (apt install lldb, brew install llvm) and put lldb-dap on PATH"
                    .to_string(),
            documentation_url: Some("https://lldb.llvm.org/resources/lldbdap.html".to_string()),
        }
    }

    async fn validate_environment(&self) -> EnvironmentReport {
        let mut report = EnvironmentReport::default();
        match self.resolve_executable(None).await {
            Ok(lldb_dap) => {
                report.version = query_version(&lldb_dap, &["--version"]).await;
                if report.version.is_none() {
                    report.warning("Could not determine the lldb-dap version");
                }
                report.executable = Some(lldb_dap);
            }
            Err(_) => report.error(format!(
                "lldb-dap not found. {}",
                self.metadata().install_guidance
            )),
        }
        report
    }

    fn default_executable_name(&self) -> &'static str {
        "lldb-dap"
    }

    fn executable_search_paths(&self) -> Vec<PathBuf> {
        [
            "/opt/homebrew/opt/llvm/bin",
            "/usr/local/opt/llvm/bin",
            "/usr/lib/llvm-19/bin",
            "/usr/lib/llvm-18/bin",
            "/usr/lib/llvm-17/bin",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand> {
        Ok(AdapterCommand::new(
            config.executable.to_string_lossy().to_string(),
        ))
    }

    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value> {
        if launch.program.extension().is_some_and(|ext| ext == "rs") {
            return Err(Error::InvalidLaunchConfig(format!(
                "{} is a source file; lldb-dap needs the compiled binary (cargo build first)",
                launch.program_display()
            )));
        }

        let mut args = base_launch_arguments(launch);
        args.insert("type".into(), "lldb-dap".into());
        args.insert("request".into(), "launch".into());
        // lldb-dap takes env as "KEY=VALUE" strings
        if !launch.options.env.is_empty() {
            let env: Vec<String> = launch
                .options
                .env
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            args.insert("env".into(), env.into());
        }
        args.insert(
            "initCommands".into(),
            RUST_LLDB_TYPE_FORMATTERS
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .into(),
        );
        Ok(merge_extra(args, launch))
    }

    fn policy(&self) -> Arc<dyn BackendPolicy> {
        Arc::new(RustPolicy)
    }
}
