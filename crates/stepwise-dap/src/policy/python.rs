//! debugpy

use super::{BackendPolicy, HandshakeOrder, SpawnPayload};
use crate::transport::{SpawnConfig, TransportKind};
use crate::DapVariable;

/// Group nodes debugpy inserts into the variables list
const GROUP_NODES: &[&str] = &["special variables", "function variables", "class variables"];

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonPolicy;

impl BackendPolicy for PythonPolicy {
    fn name(&self) -> &'static str {
        "debugpy"
    }

    fn adapter_id(&self) -> &'static str {
        "debugpy"
    }

    fn local_scope_names(&self) -> &'static [&'static str] {
        &["Locals"]
    }

    fn is_internal_variable(&self, variable: &DapVariable) -> bool {
        let name = variable.name.as_str();
        GROUP_NODES.contains(&name) || (name.len() > 4 && name.starts_with("__") && name.ends_with("__"))
    }

    /// `python -m debugpy.adapter`, spoken to over stdio
    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
        SpawnConfig::new(payload.executable.clone(), TransportKind::Stdio)
            .with_args(payload.args.clone())
            .with_cwd(payload.cwd.clone())
            .with_env(payload.env.clone())
    }

    // debugpy answers launch only once configuration is done
    fn handshake_order(&self) -> HandshakeOrder {
        HandshakeOrder::DeferredLaunchResponse
    }
}
