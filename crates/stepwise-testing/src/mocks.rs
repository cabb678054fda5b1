//! Adapter and policy for the `mock` language

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use stepwise_core::{DebugLanguage, LaunchConfig};
use stepwise_dap::{
    AdapterCommand, AdapterCommandConfig, AdapterFactory, AdapterMetadata, BackendPolicy,
    DapStackFrame, DapVariable, EnvironmentReport, HandshakeOrder, Result, SpawnConfig,
    SpawnPayload, TransportKind,
};

pub const MOCK_EXECUTABLE: &str = "/usr/local/bin/mock-dap";

/// Stdio backend with a configurable handshake order. Hides `__dunder__`
/// variables and frames named `<internal>`.
#[derive(Debug, Clone, Copy)]
pub struct MockPolicy {
    order: HandshakeOrder,
}

impl MockPolicy {
    pub fn new(order: HandshakeOrder) -> Self {
        Self { order }
    }
}

impl Default for MockPolicy {
    fn default() -> Self {
        Self::new(HandshakeOrder::LaunchThenConfigure)
    }
}

impl BackendPolicy for MockPolicy {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn adapter_id(&self) -> &'static str {
        "mock"
    }

    fn local_scope_names(&self) -> &'static [&'static str] {
        &["Locals"]
    }

    fn is_internal_variable(&self, variable: &DapVariable) -> bool {
        variable.name.starts_with("__") && variable.name.ends_with("__")
    }

    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
        SpawnConfig::new(payload.executable.clone(), TransportKind::Stdio)
            .with_args(payload.args.clone())
            .with_cwd(payload.cwd.clone())
            .with_env(payload.env.clone())
    }

    fn handshake_order(&self) -> HandshakeOrder {
        self.order
    }

    fn is_internal_frame(&self, frame: &DapStackFrame) -> bool {
        frame.name.starts_with("<internal>")
    }
}

/// Factory for [`DebugLanguage::Mock`]. Never touches the filesystem.
#[derive(Debug)]
pub struct MockAdapterFactory {
    policy: MockPolicy,
    report: Mutex<EnvironmentReport>,
    validations: AtomicUsize,
}

impl Default for MockAdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapterFactory {
    pub fn new() -> Self {
        Self {
            policy: MockPolicy::default(),
            report: Mutex::new(EnvironmentReport {
                executable: Some(PathBuf::from(MOCK_EXECUTABLE)),
                version: Some("mock-dap 1.0.0".to_string()),
                ..Default::default()
            }),
            validations: AtomicUsize::new(0),
        }
    }

    pub fn with_handshake_order(mut self, order: HandshakeOrder) -> Self {
        self.policy = MockPolicy::new(order);
        self
    }

    /// Report returned by `validate_environment`
    pub fn with_report(self, report: EnvironmentReport) -> Self {
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = report;
        self
    }

    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn AdapterFactory> {
        Arc::new(self)
    }
}

#[async_trait]
impl AdapterFactory for MockAdapterFactory {
    fn language(&self) -> DebugLanguage {
        DebugLanguage::Mock
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            language: DebugLanguage::Mock,
            display_name: "Mock".to_string(),
            adapter_name: "mock-dap".to_string(),
            description: "In-process fake backend for tests".to_string(),
            install_guidance: "Register MockAdapterFactory with the registry".to_string(),
            documentation_url: None,
        }
    }

    async fn validate_environment(&self) -> EnvironmentReport {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn default_executable_name(&self) -> &'static str {
        "mock-dap"
    }

    async fn resolve_executable(&self, preferred: Option<&Path>) -> Result<PathBuf> {
        Ok(preferred
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(MOCK_EXECUTABLE)))
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand> {
        Ok(
            AdapterCommand::new(config.executable.to_string_lossy().to_string())
                .with_args(["--port".to_string(), config.port.to_string()]),
        )
    }

    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value> {
        let mut args = json!({
            "type": "mock",
            "request": "launch",
            "program": launch.program_display(),
            "args": launch.args,
            "stopOnEntry": launch.options.stop_on_entry,
        });
        if let Some(map) = args.as_object_mut() {
            for (key, value) in &launch.options.extra {
                map.insert(key.clone(), value.clone());
            }
        }
        Ok(args)
    }

    fn policy(&self) -> Arc<dyn BackendPolicy> {
        Arc::new(self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validation_is_counted() {
        let factory = MockAdapterFactory::new();
        assert!(factory.validate_environment().await.is_valid());
        let _ = factory.validate_environment().await;
        assert_eq!(factory.validation_count(), 2);
    }

    #[test]
    fn test_spawn_config_is_stdio() {
        let factory = MockAdapterFactory::new();
        let command = factory
            .build_adapter_command(&AdapterCommandConfig::new(MOCK_EXECUTABLE, "127.0.0.1", 38000))
            .unwrap();
        let spawn = factory.policy().adapter_spawn_config(&SpawnPayload {
            executable: command.command,
            args: command.args,
            env: Default::default(),
            cwd: None,
            host: "127.0.0.1".to_string(),
            port: 38000,
        });
        assert_eq!(spawn.transport, TransportKind::Stdio);
        assert_eq!(spawn.command_line(), "/usr/local/bin/mock-dap --port 38000");
    }
}
