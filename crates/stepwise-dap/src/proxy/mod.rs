//! Proxy - owns one backend instance
//!
//! Composes a transport, a [`DapBroker`] and a [`BackendPolicy`]:
//! spawn, handshake, request routing, event relay and shutdown. Each debug
//! session owns exactly one proxy.

mod events;
mod handshake;
mod reverse;

pub use events::ProxyEvent;
pub use handshake::{BreakpointBatchResult, HandshakeOutcome, HandshakePlan};

use crate::constants::requests;
use crate::ext::DebugResult;
use crate::policy::{AdapterSpecificState, BackendPolicy};
use crate::transport::{SpawnConfig, TransportChannel, TransportConnector, TransportKind};
use crate::{
    Capabilities, DapBreakpoint, DapBroker, DapScope, DapStackFrame, DapVariable,
    DisconnectArguments, Error, EvaluateArguments, EvaluateResponseBody, Response, Result,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    StackTraceArguments, StackTraceResponseBody, Thread, ThreadArguments, ThreadsResponseBody,
    VariablesArguments, VariablesResponseBody,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use stepwise_config::AdapterConnectionConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{broadcast, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Starting,
    Ready,
    Failed,
    ShuttingDown,
    Stopped,
}

/// Whether the backend has signalled it is ready for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Pending,
    Ready,
    /// The transport closed before or after readiness
    Closed,
}

/// A command held back until the backend is ready
struct QueuedCommand {
    command: String,
    arguments: Option<serde_json::Value>,
    reply: oneshot::Sender<Result<Response>>,
}

/// A connected child session
struct ChildSession {
    broker: Arc<DapBroker>,
}

pub struct Proxy {
    policy: Arc<dyn BackendPolicy>,
    connector: Arc<dyn TransportConnector>,
    config: AdapterConnectionConfig,
    state: Mutex<ProxyState>,
    broker: RwLock<Option<Arc<DapBroker>>>,
    child: RwLock<Option<ChildSession>>,
    process: Mutex<Option<Child>>,
    terminal_processes: Mutex<Vec<Child>>,
    /// TCP endpoint of the backend, for child reconnects
    endpoint: Mutex<Option<(String, u16)>>,
    adapter_state: Mutex<AdapterSpecificState>,
    thread_id: Mutex<Option<i64>>,
    capabilities: Mutex<Option<Capabilities>>,
    readiness: watch::Sender<Readiness>,
    queue: Mutex<Vec<QueuedCommand>>,
    /// Last breakpoint batch per file, replayed into child sessions
    mirrored_breakpoints: Mutex<BTreeMap<String, serde_json::Value>>,
    events: broadcast::Sender<ProxyEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("policy", &self.policy.name())
            .field("state", &self.state.try_lock().map(|s| *s).ok())
            .finish_non_exhaustive()
    }
}

impl Proxy {
    pub fn new(
        policy: Arc<dyn BackendPolicy>,
        connector: Arc<dyn TransportConnector>,
        config: AdapterConnectionConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (readiness, _) = watch::channel(Readiness::Pending);
        let adapter_state = policy.create_initial_state();
        Arc::new(Self {
            policy,
            connector,
            config,
            state: Mutex::new(ProxyState::Stopped),
            broker: RwLock::new(None),
            child: RwLock::new(None),
            process: Mutex::new(None),
            terminal_processes: Mutex::new(Vec::new()),
            endpoint: Mutex::new(None),
            adapter_state: Mutex::new(adapter_state),
            thread_id: Mutex::new(None),
            capabilities: Mutex::new(None),
            readiness,
            queue: Mutex::new(Vec::new()),
            mirrored_breakpoints: Mutex::new(BTreeMap::new()),
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn policy(&self) -> &Arc<dyn BackendPolicy> {
        &self.policy
    }

    pub async fn state(&self) -> ProxyState {
        *self.state.lock().await
    }

    /// Ready with a live transport
    pub async fn is_running(&self) -> bool {
        if self.state().await != ProxyState::Ready {
            return false;
        }
        match self.broker.read().await.as_ref() {
            Some(broker) => broker.is_alive(),
            None => false,
        }
    }

    pub async fn adapter_state(&self) -> AdapterSpecificState {
        self.adapter_state.lock().await.clone()
    }

    pub async fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.lock().await.clone()
    }

    /// Thread of the last stop, if any
    pub async fn current_thread_id(&self) -> Option<i64> {
        *self.thread_id.lock().await
    }

    /// Events relayed from the backend, in arrival order
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    pub async fn has_child_session(&self) -> bool {
        self.child.read().await.is_some()
    }

    /// Spawn the backend and open the transport.
    ///
    /// Allowed from Stopped or Failed. On failure the proxy is Failed and can
    /// be started again.
    #[instrument(skip(self, spawn), fields(backend = self.policy.name(), transport = %spawn.transport))]
    pub async fn start(self: &Arc<Self>, spawn: &SpawnConfig) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, ProxyState::Stopped | ProxyState::Failed) {
                return Err(Error::Protocol(format!(
                    "Proxy is not stopped (state: {:?})",
                    *state
                )));
            }
            *state = ProxyState::Starting;
        }

        let result = self.open(spawn).await;
        let mut state = self.state.lock().await;
        match &result {
            Ok(()) => {
                *state = ProxyState::Ready;
                info!("Backend started: {}", spawn.command_line());
            }
            Err(e) => {
                *state = ProxyState::Failed;
                warn!("Backend failed to start: {}", e);
            }
        }
        result
    }

    async fn open(self: &Arc<Self>, spawn: &SpawnConfig) -> Result<()> {
        let TransportChannel {
            reader,
            writer,
            process,
        } = self.connector.open(spawn).await?;

        *self.process.lock().await = process;
        *self.endpoint.lock().await = match &spawn.transport {
            TransportKind::TcpConnect { host, port } => Some((host.clone(), *port)),
            _ => None,
        };

        let broker = Arc::new(DapBroker::new_with_config(reader, writer, self.config.clone()));
        let broker_events = broker.subscribe_events().await;
        let reverse_requests = broker.take_reverse_requests().await;

        {
            let mut state = self.adapter_state.lock().await;
            *state = self.policy.create_initial_state();
            state.connected = true;
        }
        *self.thread_id.lock().await = None;
        self.readiness.send_replace(Readiness::Pending);

        let relay = events::spawn_relay(Arc::downgrade(self), broker_events, false);
        let reverse =
            reverse::spawn_reverse_handler(Arc::downgrade(self), reverse_requests, broker.clone());
        self.tasks.lock().await.extend([relay, reverse]);

        *self.broker.write().await = Some(broker);
        Ok(())
    }

    async fn live_broker(&self) -> Result<Arc<DapBroker>> {
        let broker = self
            .broker
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::NotRunning(format!("{} is not started", self.policy.name())))?;
        if broker.is_closed().await {
            return Err(Error::NotRunning(format!(
                "{} connection closed",
                self.policy.name()
            )));
        }
        Ok(broker)
    }

    /// Send a request, applying policy queueing and child routing
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response> {
        let broker = self.live_broker().await?;

        let queued = {
            let mut state = self.adapter_state.lock().await;
            self.policy.update_state_on_command(command, &mut state);
            if self.policy.should_queue_command(command, &state) {
                let (tx, rx) = oneshot::channel();
                self.queue.lock().await.push(QueuedCommand {
                    command: command.to_string(),
                    arguments: arguments.clone(),
                    reply: tx,
                });
                Some(rx)
            } else {
                None
            }
        };

        if let Some(rx) = queued {
            debug!(command, "Queued until backend is ready");
            let timeout = Duration::from_millis(self.config.ready_timeout_ms);
            return match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(Error::NotRunning(format!(
                    "'{}' was queued but the backend went away",
                    command
                ))),
                Err(_) => Err(Error::Timeout(self.config.ready_timeout_ms)),
            };
        }

        self.dispatch_now(&broker, command, arguments).await
    }

    async fn dispatch_now(
        &self,
        broker: &Arc<DapBroker>,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response> {
        if command == requests::SET_BREAKPOINTS {
            self.mirror_breakpoints(arguments.as_ref()).await;
        }

        if self.policy.should_route_to_child(command) {
            let child = self.child.read().await.as_ref().map(|c| c.broker.clone());
            if let Some(child) = child {
                return child.send_request(command, arguments).await;
            }
        }

        broker.send_request(command, arguments).await
    }

    /// Remember the batch and forward it to an active child
    async fn mirror_breakpoints(&self, arguments: Option<&serde_json::Value>) {
        let Some(arguments) = arguments else { return };
        let Some(path) = arguments
            .pointer("/source/path")
            .and_then(|p| p.as_str())
            .map(str::to_string)
        else {
            return;
        };
        if self.policy.child_session_strategy().is_none() {
            return;
        }
        self.mirrored_breakpoints
            .lock()
            .await
            .insert(path, arguments.clone());

        let child = self.child.read().await.as_ref().map(|c| c.broker.clone());
        if let Some(child) = child {
            child
                .send_request(requests::SET_BREAKPOINTS, Some(arguments.clone()))
                .await
                .debug_ok("Failed to mirror breakpoints into child session");
        }
    }

    /// Release commands held back before the ready signal
    pub(crate) async fn flush_queue(self: &Arc<Self>) {
        let queued: Vec<QueuedCommand> = std::mem::take(&mut *self.queue.lock().await);
        if queued.is_empty() {
            return;
        }
        debug!("Flushing {} queued command(s)", queued.len());
        let broker = match self.live_broker().await {
            Ok(broker) => broker,
            Err(e) => {
                for item in queued {
                    let _ = item.reply.send(Err(e.clone()));
                }
                return;
            }
        };
        for item in queued {
            let proxy = self.clone();
            let broker = broker.clone();
            tokio::spawn(async move {
                let result = proxy
                    .dispatch_now(&broker, &item.command, item.arguments)
                    .await;
                let _ = item.reply.send(result);
            });
        }
    }

    /// Send a request and decode the body of a successful response
    pub async fn request_typed<T, A>(&self, command: &str, arguments: &A) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        let arguments = serde_json::to_value(arguments)?;
        self.send_request(command, Some(arguments))
            .await?
            .into_success()?
            .body_as()
    }

    pub async fn threads(&self) -> Result<Vec<Thread>> {
        let body: ThreadsResponseBody = self
            .send_request(requests::THREADS, None)
            .await?
            .into_success()?
            .body_as()?;
        Ok(body.threads)
    }

    pub async fn stack_trace(&self, thread_id: i64, levels: i64) -> Result<Vec<DapStackFrame>> {
        let args = StackTraceArguments {
            thread_id,
            start_frame: Some(0),
            levels: Some(levels),
        };
        let body: StackTraceResponseBody =
            self.request_typed(requests::STACK_TRACE, &args).await?;
        Ok(body.stack_frames)
    }

    pub async fn scopes(&self, frame_id: i64) -> Result<Vec<DapScope>> {
        let body: ScopesResponseBody = self
            .request_typed(requests::SCOPES, &ScopesArguments { frame_id })
            .await?;
        Ok(body.scopes)
    }

    pub async fn variables(&self, variables_reference: i64) -> Result<Vec<DapVariable>> {
        let args = VariablesArguments {
            variables_reference,
            filter: None,
        };
        let body: VariablesResponseBody = self.request_typed(requests::VARIABLES, &args).await?;
        Ok(body.variables)
    }

    pub async fn evaluate(&self, args: &EvaluateArguments) -> Result<EvaluateResponseBody> {
        self.request_typed(requests::EVALUATE, args).await
    }

    /// Replace the breakpoints of one file. A rejected batch is
    /// `RequestFailed` carrying the backend message.
    pub async fn set_breakpoints(
        &self,
        args: &SetBreakpointsArguments,
    ) -> Result<Vec<DapBreakpoint>> {
        let body: SetBreakpointsResponseBody =
            self.request_typed(requests::SET_BREAKPOINTS, args).await?;
        Ok(body.breakpoints)
    }

    /// `continue`, `next`, `stepIn`, `stepOut` or `pause` for one thread
    pub async fn thread_command(&self, command: &str, thread_id: i64) -> Result<Response> {
        let args = serde_json::to_value(ThreadArguments::new(thread_id))?;
        self.send_request(command, Some(args)).await?.into_success()
    }

    /// Graceful disconnect bounded by the shutdown timeout, then kill.
    /// Idempotent.
    #[instrument(skip(self), fields(backend = self.policy.name()))]
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, ProxyState::Stopped | ProxyState::ShuttingDown) {
                return Ok(());
            }
            *state = ProxyState::ShuttingDown;
        }

        let grace = Duration::from_millis(self.config.shutdown_timeout_ms);
        let broker = self.broker.write().await.take();
        let child = self.child.write().await.take();

        if let Some(broker) = &broker {
            if !broker.is_closed().await {
                let args = DisconnectArguments {
                    restart: None,
                    terminate_debuggee: true,
                };
                let disconnect = async {
                    if let Some(child) = &child {
                        let _ = child
                            .broker
                            .send_request(requests::DISCONNECT, serde_json::to_value(&args).ok())
                            .await;
                    }
                    broker
                        .send_request(requests::DISCONNECT, serde_json::to_value(&args).ok())
                        .await
                };
                match tokio::time::timeout(grace, disconnect).await {
                    Ok(Ok(_)) => debug!("Backend acknowledged disconnect"),
                    Ok(Err(e)) => debug!("Disconnect failed: {}", e),
                    Err(_) => debug!("Disconnect not acknowledged within {}ms", grace.as_millis()),
                }
            }
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        drop(child);
        drop(broker);

        if let Some(mut process) = self.process.lock().await.take() {
            reap(&mut process).await;
        }
        for mut process in self.terminal_processes.lock().await.drain(..) {
            reap(&mut process).await;
        }

        self.queue.lock().await.clear();
        self.readiness.send_replace(Readiness::Closed);
        self.adapter_state.lock().await.connected = false;
        *self.state.lock().await = ProxyState::Stopped;
        info!("Backend stopped");
        Ok(())
    }
}

/// Kill a process unless it already exited, and reap it
async fn reap(process: &mut Child) {
    match process.try_wait() {
        Ok(Some(status)) => debug!("Process already exited: {}", status),
        _ => match process.kill().await {
            Ok(()) => debug!("Process killed"),
            Err(e) => warn!("Failed to kill process: {}", e),
        },
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        // Best effort: cannot await here
        if let Some(mut child) = self.process.try_lock().ok().and_then(|mut p| p.take()) {
            let _ = child.start_kill();
        }
        if let Ok(mut terminals) = self.terminal_processes.try_lock() {
            for child in terminals.iter_mut() {
                let _ = child.start_kill();
            }
        }
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
