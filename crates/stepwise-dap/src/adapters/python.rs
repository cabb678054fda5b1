//! Python via debugpy's adapter (`python -m debugpy.adapter`) over stdio

use super::{
    base_launch_arguments, merge_extra, query_version, AdapterCommand, AdapterCommandConfig,
    AdapterFactory, AdapterMetadata, EnvironmentReport,
};
use crate::policy::{BackendPolicy, PythonPolicy};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use stepwise_core::{DebugLanguage, LaunchConfig};

const MIN_PYTHON: (u32, u32) = (3, 8);

#[derive(Debug, Default)]
pub struct PythonAdapterFactory;

impl PythonAdapterFactory {
    pub fn new() -> Self {
        Self
    }
}

/// "Python 3.11.4" -> (3, 11)
fn parse_python_version(output: &str) -> Option<(u32, u32)> {
    let version = output.trim().strip_prefix("Python ")?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

#[async_trait]
impl AdapterFactory for PythonAdapterFactory {
    fn language(&self) -> DebugLanguage {
        DebugLanguage::Python
    }

    fn metadata(&self) -> AdapterMetadata {
        AdapterMetadata {
            language: DebugLanguage::Python,
            display_name: "Python (debugpy)".to_string(),
            adapter_name: "debugpy".to_string(),
            description: "Python debugging through the debugpy adapter".to_string(),
            install_guidance: "Install Python 3.8+ and debugpy: python3 -m pip install debugpy"
                .to_string(),
            documentation_url: Some("https://github.com/microsoft/debugpy".to_string()),
        }
    }

    async fn validate_environment(&self) -> EnvironmentReport {
        let mut report = EnvironmentReport::default();
        let python = match self.resolve_executable(None).await {
            Ok(path) => path,
            Err(_) => {
                report.error("python3 not found on PATH. Install Python 3.8+");
                return report;
            }
        };
        report.executable = Some(python.clone());

        match query_version(&python, &["--version"]).await {
            Some(line) => {
                match parse_python_version(&line) {
                    Some(version) if version < MIN_PYTHON => report.error(format!(
                        "{} is below the minimum supported Python {}.{}",
                        line, MIN_PYTHON.0, MIN_PYTHON.1
                    )),
                    Some(_) => {}
                    None => report.warning(format!("Could not parse Python version from '{}'", line)),
                }
                report.version = Some(line);
            }
            None => report.warning("Could not determine the Python version"),
        }

        if query_version(&python, &["-c", "import debugpy; print(debugpy.__version__)"])
            .await
            .is_none()
        {
            report.error(format!(
                "debugpy is not importable by {}. Install with: python3 -m pip install debugpy",
                python.display()
            ));
        }
        report
    }

    fn default_executable_name(&self) -> &'static str {
        "python3"
    }

    fn build_adapter_command(&self, config: &AdapterCommandConfig) -> Result<AdapterCommand> {
        Ok(
            AdapterCommand::new(config.executable.to_string_lossy().to_string())
                .with_args(["-m", "debugpy.adapter"]),
        )
    }

    fn transform_launch_config(&self, launch: &LaunchConfig) -> Result<serde_json::Value> {
        let mut args = base_launch_arguments(launch);
        args.insert("type".into(), "python".into());
        args.insert("request".into(), "launch".into());
        args.insert("console".into(), "internalConsole".into());
        args.insert("redirectOutput".into(), true.into());
        args.insert(
            "justMyCode".into(),
            launch.options.just_my_code.unwrap_or(true).into(),
        );
        Ok(merge_extra(args, launch))
    }

    fn policy(&self) -> Arc<dyn BackendPolicy> {
        Arc::new(PythonPolicy)
    }
}
