//! lldb-dap

use super::{BackendPolicy, SpawnPayload};
use crate::transport::{SpawnConfig, TransportKind};
use crate::DapVariable;

#[derive(Debug, Default, Clone, Copy)]
pub struct RustPolicy;

impl BackendPolicy for RustPolicy {
    fn name(&self) -> &'static str {
        "lldb-dap"
    }

    fn adapter_id(&self) -> &'static str {
        "lldb-dap"
    }

    fn local_scope_names(&self) -> &'static [&'static str] {
        &["Locals", "Local"]
    }

    /// LLDB convenience variables (`$0`, `$__lldb_...`)
    fn is_internal_variable(&self, variable: &DapVariable) -> bool {
        variable.name.starts_with('$')
    }

    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
        SpawnConfig::new(payload.executable.clone(), TransportKind::Stdio)
            .with_args(payload.args.clone())
            .with_cwd(payload.cwd.clone())
            .with_env(payload.env.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_filters_lldb_convenience_variables() {
        let variables = vars(&["$0", "$__lldb_result", "message", "count"]);
        let locals = RustPolicy.extract_local_variables(&[], &[], &variables, false);
        assert_eq!(names(&locals), vec!["message", "count"]);
    }

    #[test]
    fn test_local_scope_lookup() {
        let scopes = vec![scope("Registers", 3), scope("Locals", 4), scope("Globals", 5)];
        assert_eq!(
            RustPolicy.find_local_scope(&scopes).unwrap().variables_reference,
            4
        );
    }
}
