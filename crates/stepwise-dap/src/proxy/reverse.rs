//! Reverse requests: `runInTerminal` and `startDebugging` sent by the backend.

use super::{events, ChildSession, Proxy};
use crate::constants::{events as event_names, requests};
use crate::policy::ReverseRequestAction;
use crate::{
    DapBroker, Error, InitializeRequestArguments, Request, Result, RunInTerminalRequestArguments,
    StartDebuggingRequestArguments,
};
use serde_json::json;
use std::process::Stdio;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(super) fn spawn_reverse_handler(
    proxy: Weak<Proxy>,
    mut requests: mpsc::Receiver<Request>,
    broker: Arc<DapBroker>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let Some(proxy) = proxy.upgrade() else {
                return;
            };
            let action = {
                let state = proxy.adapter_state.lock().await;
                proxy.policy.handle_reverse_request(&request, &state)
            };
            debug!(command = %request.command, "Reverse request");

            match action {
                ReverseRequestAction::Respond {
                    success,
                    body,
                    message,
                } => respond(&broker, &request, success, body, message).await,
                ReverseRequestAction::RunInTerminal(args) => {
                    match proxy.run_in_terminal(&args).await {
                        Ok(pid) => {
                            let body = json!({ "processId": pid });
                            respond(&broker, &request, true, Some(body), None).await
                        }
                        Err(e) => {
                            respond(&broker, &request, false, None, Some(e.to_string())).await
                        }
                    }
                }
                ReverseRequestAction::StartChild(args) => {
                    // Child setup issues requests of its own; keep reading
                    let broker = broker.clone();
                    tokio::spawn(async move {
                        match proxy.start_child(&args).await {
                            Ok(()) => respond(&broker, &request, true, None, None).await,
                            Err(e) => {
                                warn!("Child session failed to start: {}", e);
                                respond(&broker, &request, false, None, Some(e.to_string()))
                                    .await
                            }
                        }
                    });
                }
            }
        }
    })
}

async fn respond(
    broker: &DapBroker,
    request: &Request,
    success: bool,
    body: Option<serde_json::Value>,
    message: Option<String>,
) {
    if let Err(e) = broker.send_response(request, success, body, message).await {
        debug!("Failed to answer '{}': {}", request.command, e);
    }
}

impl Proxy {
    /// Spawn the debuggee command line the backend asked for
    async fn run_in_terminal(&self, args: &RunInTerminalRequestArguments) -> Result<Option<u32>> {
        let Some((program, rest)) = args.args.split_first() else {
            return Err(Error::Protocol("runInTerminal without a command".to_string()));
        };

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if !args.cwd.is_empty() {
            command.current_dir(&args.cwd);
        }
        for (key, value) in &args.env {
            match value {
                Some(value) => command.env(key, value),
                None => command.env_remove(key),
            };
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound(program.clone())
            } else {
                Error::from(e)
            }
        })?;
        let pid = child.id();
        info!(pid, "Started debuggee for {}", program);
        self.terminal_processes.lock().await.push(child);
        Ok(pid)
    }

    /// Connect a child session announced by `startDebugging`
    async fn start_child(self: &Arc<Self>, args: &StartDebuggingRequestArguments) -> Result<()> {
        let launch_args = self.policy.build_child_start_args(args)?;
        let (host, port) = self
            .endpoint
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::ChildSessionsUnsupported(self.policy.name().to_string()))?;

        let channel = self.connector.open_child(&host, port).await?;
        let broker = Arc::new(DapBroker::new_with_config(
            channel.reader,
            channel.writer,
            self.config.clone(),
        ));
        let mut ready_events = broker.subscribe_events().await;
        let relay_events = broker.subscribe_events().await;
        let reverse_requests = broker.take_reverse_requests().await;

        let relay = events::spawn_relay(Arc::downgrade(self), relay_events, true);
        let reverse =
            spawn_reverse_handler(Arc::downgrade(self), reverse_requests, broker.clone());
        self.tasks.lock().await.extend([relay, reverse]);

        let init = InitializeRequestArguments::for_adapter(self.policy.adapter_id());
        broker
            .send_request(requests::INITIALIZE, Some(serde_json::to_value(&init)?))
            .await?
            .into_success()?;

        let command = if args.request == requests::ATTACH {
            requests::ATTACH
        } else {
            requests::LAUNCH
        };
        let launch = broker.dispatch(command, Some(launch_args)).await?;

        let ready = Duration::from_millis(self.config.ready_timeout_ms);
        let initialized = tokio::time::timeout(ready, async {
            while let Some(event) = ready_events.recv().await {
                if event.event == event_names::INITIALIZED {
                    return true;
                }
            }
            false
        })
        .await;
        match initialized {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::Communication(
                    "Child session closed before it was initialized".to_string(),
                ))
            }
            Err(_) => return Err(Error::Timeout(self.config.ready_timeout_ms)),
        }
        drop(ready_events);

        let mirrored: Vec<serde_json::Value> =
            self.mirrored_breakpoints.lock().await.values().cloned().collect();
        for batch in mirrored {
            if let Err(e) = broker
                .send_request(requests::SET_BREAKPOINTS, Some(batch))
                .await
            {
                debug!("Failed to replay breakpoints into child session: {}", e);
            }
        }
        broker
            .send_request(requests::CONFIGURATION_DONE, None)
            .await?
            .into_success()?;
        launch.wait().await?.into_success()?;

        *self.child.write().await = Some(ChildSession { broker });
        self.adapter_state.lock().await.child_active = true;
        info!("Child session attached on {}:{}", host, port);
        Ok(())
    }
}
