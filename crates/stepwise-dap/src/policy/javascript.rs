//! js-debug (`dapDebugServer`)
//!
//! The parent session only supervises; the program itself runs in a child
//! session announced through a `startDebugging` reverse request. The client
//! opens a second connection to the same server and launches the child
//! configuration there (it carries a `__pendingTargetId`). Execution control
//! and inspection then go to the child.

use super::{BackendPolicy, ChildSessionStrategy, HandshakeOrder, SpawnPayload};
use crate::constants::requests;
use crate::transport::{SpawnConfig, TransportKind};
use crate::{DapStackFrame, DapVariable, Error, Result, StartDebuggingRequestArguments};

const PENDING_TARGET_KEY: &str = "__pendingTargetId";

/// Commands that act on the debuggee and therefore belong to the child
const CHILD_COMMANDS: &[&str] = &[
    requests::THREADS,
    requests::STACK_TRACE,
    requests::SCOPES,
    requests::VARIABLES,
    requests::EVALUATE,
    requests::CONTINUE,
    requests::NEXT,
    requests::STEP_IN,
    requests::STEP_OUT,
    requests::PAUSE,
];

const INTERNAL_FRAME_PREFIXES: &[&str] = &["node:internal", "<node_internals>"];

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptPolicy;

impl BackendPolicy for JavaScriptPolicy {
    fn name(&self) -> &'static str {
        "js-debug"
    }

    fn adapter_id(&self) -> &'static str {
        "pwa-node"
    }

    /// js-debug names the scope after the function: "Local: handler"
    fn local_scope_names(&self) -> &'static [&'static str] {
        &["Local"]
    }

    fn is_internal_variable(&self, variable: &DapVariable) -> bool {
        matches!(variable.name.as_str(), "this" | "__proto__")
    }

    fn requires_command_queueing(&self) -> bool {
        true
    }

    /// `node dapDebugServer.js <port> <host>`; we connect to it
    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
        SpawnConfig::new(
            payload.executable.clone(),
            TransportKind::TcpConnect {
                host: payload.host.clone(),
                port: payload.port,
            },
        )
        .with_args(payload.args.clone())
        .with_cwd(payload.cwd.clone())
        .with_env(payload.env.clone())
    }

    fn handshake_order(&self) -> HandshakeOrder {
        HandshakeOrder::DeferredLaunchResponse
    }

    fn child_session_strategy(&self) -> Option<ChildSessionStrategy> {
        Some(ChildSessionStrategy::ReconnectToParent)
    }

    fn build_child_start_args(
        &self,
        args: &StartDebuggingRequestArguments,
    ) -> Result<serde_json::Value> {
        if !args.configuration.contains_key(PENDING_TARGET_KEY) {
            return Err(Error::Protocol(format!(
                "startDebugging configuration has no {}",
                PENDING_TARGET_KEY
            )));
        }
        Ok(serde_json::Value::Object(args.configuration.clone()))
    }

    fn should_route_to_child(&self, command: &str) -> bool {
        CHILD_COMMANDS.contains(&command)
    }

    fn is_internal_frame(&self, frame: &DapStackFrame) -> bool {
        let path = frame.source_path().unwrap_or_default();
        INTERNAL_FRAME_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix) || frame.name.contains(prefix))
    }
}
