//! Backend policies
//!
//! Every backend deviates from the protocol in its own small ways: what it
//! calls the local scope, which variables are noise, when it is ready for
//! configuration, whether the launch response arrives before or after
//! `configurationDone`, and whether it spawns child sessions. A
//! [`BackendPolicy`] captures those deviations as one stateless strategy
//! object per backend. Mutable per-connection facts live in
//! [`AdapterSpecificState`], owned by the proxy and passed in.

mod go;
mod javascript;
mod python;
mod rust;

pub use go::GoPolicy;
pub use javascript::JavaScriptPolicy;
pub use python::PythonPolicy;
pub use rust::RustPolicy;

use crate::constants::{events, requests, reverse_requests};
use crate::transport::SpawnConfig;
use crate::{
    DapScope, DapStackFrame, DapVariable, Error, Event, Request, Result,
    RunInTerminalRequestArguments, StartDebuggingRequestArguments,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Requests that drive the handshake and are never held back by queueing
const HANDSHAKE_COMMANDS: &[&str] = &[
    requests::INITIALIZE,
    requests::LAUNCH,
    requests::ATTACH,
    requests::DISCONNECT,
    requests::TERMINATE,
];

/// Per-connection protocol facts, owned by one proxy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSpecificState {
    /// The backend's ready signal has been seen
    pub initialized: bool,
    pub launch_sent: bool,
    pub configuration_done: bool,
    /// The transport is open
    pub connected: bool,
    /// A child session is connected and receives routed commands
    pub child_active: bool,
    pub last_command: Option<String>,
}

/// Order of the launch response relative to configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOrder {
    /// Launch is answered only after `configurationDone`; send it, configure,
    /// then collect the response
    DeferredLaunchResponse,
    /// Launch is answered right away; wait for it before configuring
    LaunchThenConfigure,
}

/// How the proxy should answer a reverse request
#[derive(Debug, Clone, PartialEq)]
pub enum ReverseRequestAction {
    Respond {
        success: bool,
        body: Option<serde_json::Value>,
        message: Option<String>,
    },
    RunInTerminal(RunInTerminalRequestArguments),
    StartChild(StartDebuggingRequestArguments),
}

impl ReverseRequestAction {
    pub fn reject(message: impl Into<String>) -> Self {
        ReverseRequestAction::Respond {
            success: false,
            body: None,
            message: Some(message.into()),
        }
    }
}

/// How child sessions announced through `startDebugging` are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSessionStrategy {
    /// Open a new connection to the parent's TCP endpoint and launch the
    /// child configuration over it
    ReconnectToParent,
}

/// Inputs a policy needs to describe the backend process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnPayload {
    pub executable: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

/// Per-backend protocol strategy
pub trait BackendPolicy: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// `adapterID` sent with `initialize`
    fn adapter_id(&self) -> &'static str;

    /// Scope names that hold locals, in preference order
    fn local_scope_names(&self) -> &'static [&'static str];

    fn find_local_scope<'a>(&self, scopes: &'a [DapScope]) -> Option<&'a DapScope> {
        let names = self.local_scope_names();
        names
            .iter()
            .find_map(|name| scopes.iter().find(|s| s.name == *name))
            .or_else(|| {
                scopes.iter().find(|s| {
                    s.presentation_hint.as_deref() == Some("locals")
                        || names.iter().any(|name| s.name.starts_with(name))
                })
            })
    }

    /// Runtime-generated names hidden unless special variables are requested
    fn is_internal_variable(&self, _variable: &DapVariable) -> bool {
        false
    }

    fn extract_local_variables(
        &self,
        _frames: &[DapStackFrame],
        _scopes: &[DapScope],
        variables: &[DapVariable],
        include_special: bool,
    ) -> Vec<DapVariable> {
        variables
            .iter()
            .filter(|v| include_special || !self.is_internal_variable(v))
            .cloned()
            .collect()
    }

    fn create_initial_state(&self) -> AdapterSpecificState {
        AdapterSpecificState::default()
    }

    fn is_session_ready(&self, state: &AdapterSpecificState) -> bool {
        state.initialized
    }

    fn requires_command_queueing(&self) -> bool {
        false
    }

    fn should_queue_command(&self, command: &str, state: &AdapterSpecificState) -> bool {
        self.requires_command_queueing()
            && !self.is_session_ready(state)
            && !HANDSHAKE_COMMANDS.contains(&command)
    }

    fn is_ready_event(&self, event: &Event) -> bool {
        event.event == events::INITIALIZED
    }

    fn update_state_on_command(&self, command: &str, state: &mut AdapterSpecificState) {
        state.last_command = Some(command.to_string());
        match command {
            requests::LAUNCH | requests::ATTACH => state.launch_sent = true,
            requests::CONFIGURATION_DONE => state.configuration_done = true,
            _ => {}
        }
    }

    fn update_state_on_event(&self, event: &Event, state: &mut AdapterSpecificState) {
        if self.is_ready_event(event) {
            state.initialized = true;
        }
        if event.event == events::TERMINATED {
            state.connected = false;
            state.child_active = false;
        }
    }

    fn is_initialized(&self, state: &AdapterSpecificState) -> bool {
        state.initialized
    }

    fn is_connected(&self, state: &AdapterSpecificState) -> bool {
        state.connected
    }

    fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig;

    fn handshake_order(&self) -> HandshakeOrder {
        HandshakeOrder::LaunchThenConfigure
    }

    fn handle_reverse_request(
        &self,
        request: &Request,
        _state: &AdapterSpecificState,
    ) -> ReverseRequestAction {
        match request.command.as_str() {
            reverse_requests::RUN_IN_TERMINAL => match request.arguments_as() {
                Some(args) => ReverseRequestAction::RunInTerminal(args),
                None => ReverseRequestAction::reject("malformed runInTerminal arguments"),
            },
            reverse_requests::START_DEBUGGING if self.child_session_strategy().is_some() => {
                match request.arguments_as() {
                    Some(args) => ReverseRequestAction::StartChild(args),
                    None => ReverseRequestAction::reject("malformed startDebugging arguments"),
                }
            }
            other => ReverseRequestAction::reject(format!(
                "'{}' is not supported for {}",
                other,
                self.name()
            )),
        }
    }

    fn child_session_strategy(&self) -> Option<ChildSessionStrategy> {
        None
    }

    /// Launch arguments for a child announced by `startDebugging`
    fn build_child_start_args(
        &self,
        _args: &StartDebuggingRequestArguments,
    ) -> Result<serde_json::Value> {
        Err(Error::ChildSessionsUnsupported(self.name().to_string()))
    }

    fn should_route_to_child(&self, _command: &str) -> bool {
        false
    }

    /// Runtime frames hidden from stack traces unless internals are requested
    fn is_internal_frame(&self, _frame: &DapStackFrame) -> bool {
        false
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::transport::TransportKind;

    #[derive(Debug)]
    struct Plain;

    impl BackendPolicy for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }
        fn adapter_id(&self) -> &'static str {
            "plain"
        }
        fn local_scope_names(&self) -> &'static [&'static str] {
            &["Locals"]
        }
        fn adapter_spawn_config(&self, payload: &SpawnPayload) -> SpawnConfig {
            SpawnConfig::new(payload.executable.clone(), TransportKind::Stdio)
        }
    }

    #[test]
    fn test_state_tracks_commands_and_ready_event() {
        let policy = Plain;
        let mut state = policy.create_initial_state();
        policy.update_state_on_command("launch", &mut state);
        assert!(state.launch_sent);
        assert_eq!(state.last_command.as_deref(), Some("launch"));

        assert!(!policy.is_initialized(&state));
        policy.update_state_on_event(&Event::new(1, "initialized"), &mut state);
        assert!(policy.is_initialized(&state));

        policy.update_state_on_command("configurationDone", &mut state);
        assert!(state.configuration_done);
    }

    #[test]
    fn test_no_queueing_by_default() {
        let policy = Plain;
        let state = policy.create_initial_state();
        assert!(!policy.should_queue_command("setBreakpoints", &state));
    }

    #[test]
    fn test_default_rejects_start_debugging() {
        let policy = Plain;
        let request = Request::new(1, "startDebugging")
            .with_arguments(serde_json::json!({"request": "launch", "configuration": {}}));
        let action = policy.handle_reverse_request(&request, &AdapterSpecificState::default());
        assert!(matches!(
            action,
            ReverseRequestAction::Respond { success: false, .. }
        ));

        let args = StartDebuggingRequestArguments {
            configuration: Default::default(),
            request: "launch".into(),
        };
        assert!(matches!(
            policy.build_child_start_args(&args),
            Err(Error::ChildSessionsUnsupported(_))
        ));
    }

    #[test]
    fn test_run_in_terminal_is_parsed() {
        let request = Request::new(2, "runInTerminal")
            .with_arguments(serde_json::json!({"cwd": "/tmp", "args": ["node", "a.js"]}));
        match Plain.handle_reverse_request(&request, &AdapterSpecificState::default()) {
            ReverseRequestAction::RunInTerminal(args) => assert_eq!(args.args[0], "node"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_local_scope_prefers_exact_then_prefix() {
        let scopes = vec![scope("Globals", 1), scope("Locals (3)", 2)];
        assert_eq!(Plain.find_local_scope(&scopes).unwrap().variables_reference, 2);

        let scopes = vec![scope("Locals (3)", 2), scope("Locals", 5)];
        assert_eq!(Plain.find_local_scope(&scopes).unwrap().variables_reference, 5);

        assert!(Plain.find_local_scope(&[scope("Registers", 9)]).is_none());
    }
}
