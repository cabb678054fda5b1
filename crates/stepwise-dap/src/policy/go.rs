//! Delve (`dlv dap`)

use super::{BackendPolicy, SpawnPayload};
use crate::transport::{SpawnConfig, TransportKind};
use crate::DapVariable;

#[derive(Debug, Default, Clone, Copy)]
pub struct GoPolicy;

impl BackendPolicy for GoPolicy {
    fn name(&self) -> &'static str {
        "delve"
    }

    fn adapter_id(&self) -> &'static str {
        "go"
    }

    fn local_scope_names(&self) -> &'static [&'static str] {
        &["Locals", "Local"]
    }

    /// Compiler temporaries (`~r0`) and closure captures (`.this`)
    fn is_internal_variable(&self, variable: &DapVariable) -> bool {
        variable.name.starts_with('~') || variable.name.starts_with('.')
    }

    /// `dlv dap --client-addr host:port` dials a listener we own
    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
        SpawnConfig::new(
            payload.executable.clone(),
            TransportKind::TcpListen {
                host: payload.host.clone(),
                port: payload.port,
            },
        )
        .with_args(payload.args.clone())
        .with_cwd(payload.cwd.clone())
        .with_env(payload.env.clone())
    }
}
