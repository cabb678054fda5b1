//! start_debugging: resolve the backend, spawn it, run the handshake

use crate::breakpoints::{apply_entries, sync_file};
use crate::events::{apply_event, spawn_pump, Flow};
use crate::managed::ManagedSession;
use crate::manager::{payload, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::{ephemeral_port, find_available_port};
use stepwise_core::{
    BreakpointId, DebugSession, Error, ExecutionState, LaunchConfig, LaunchOptions, OpResult,
    Result, SessionId, SessionLifecycle, StartOutcome,
};
use stepwise_dap::{
    AdapterCommandConfig, AdapterFactory, BreakpointBatchResult, HandshakePlan, Proxy,
    ProxyEvent, SetBreakpointsArguments, SourceBreakpoint, SpawnConfig, SpawnPayload,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, instrument, warn};

/// What to debug and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    /// Program, script or package to debug
    pub target: PathBuf,
    pub args: Vec<String>,
    pub launch: LaunchOptions,
    /// Describe the backend command without spawning anything
    pub dry_run: bool,
}

impl StartRequest {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    pub fn stop_on_entry(mut self) -> Self {
        self.launch.stop_on_entry = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Everything needed to spawn the backend
struct Prepared {
    factory: Arc<dyn AdapterFactory>,
    launch_args: serde_json::Value,
    spawn: SpawnConfig,
}

impl SessionManager {
    /// Start the backend for a Created session.
    ///
    /// Dry runs stop after building the spawn description and leave the
    /// session Created.
    #[instrument(skip(self, request), fields(session = %id, target = %request.target.display(), dry_run = request.dry_run))]
    pub async fn start_debugging(
        &self,
        id: &SessionId,
        request: StartRequest,
    ) -> Result<OpResult<StartOutcome>> {
        let (managed, snapshot) = self.live(id).await?;
        let result = self.start_inner(&managed, snapshot, request).await;
        Ok(payload("start_debugging", id, result))
    }

    async fn start_inner(
        &self,
        managed: &Arc<ManagedSession>,
        snapshot: DebugSession,
        request: StartRequest,
    ) -> Result<StartOutcome> {
        if snapshot.lifecycle() != SessionLifecycle::Created {
            return Err(Error::SessionAlreadyStarted(snapshot.id.to_string()));
        }

        let prepared = self.prepare(&snapshot, &request).await?;
        if request.dry_run {
            info!("Dry run: {}", prepared.spawn.command_line());
            return Ok(StartOutcome::DryRun {
                command_line: prepared.spawn.command_line(),
                transport: prepared.spawn.transport.to_string(),
            });
        }

        let (batches, sent) = {
            let mut session = managed.session.lock().await;
            if !session.activate() {
                return Err(Error::SessionAlreadyStarted(snapshot.id.to_string()));
            }
            breakpoint_batches(&session)
        };

        let proxy = Proxy::new(
            prepared.factory.policy(),
            self.connector.clone(),
            self.adapter_config.clone(),
        );
        managed.set_proxy(proxy.clone()).await;

        if let Err(e) = proxy.start(&prepared.spawn).await {
            self.mark_error(managed).await;
            return Err(e.into());
        }

        let events = proxy.subscribe();
        let plan = HandshakePlan {
            launch_command: prepared.factory.launch_request().to_string(),
            launch_args: prepared.launch_args,
            breakpoints: batches,
        };
        let outcome = match proxy.handshake(plan).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.mark_error(managed).await;
                if let Err(shutdown) = proxy.shutdown().await {
                    debug!("Shutdown after failed handshake: {}", shutdown);
                }
                return Err(e.into());
            }
        };

        apply_batch_results(managed, &sent, outcome.breakpoint_results).await;
        let events = self
            .settle_initial_state(
                managed,
                &proxy,
                events,
                outcome.initial_stop.is_some(),
                request.launch.stop_on_entry,
            )
            .await;
        if let Some(events) = events {
            managed
                .set_pump(spawn_pump(
                    Arc::downgrade(managed),
                    proxy.clone(),
                    events,
                    self.location_timeout(),
                ))
                .await;
            flush_late_breakpoints(managed, &proxy, &sent).await;
        }

        let session = managed.session.lock().await;
        let state = session
            .execution_state()
            .unwrap_or(ExecutionState::Terminated);
        info!(%state, "Debugging started");
        Ok(StartOutcome::Started {
            state,
            location: session.current_location.clone(),
        })
    }

    /// Resolve the adapter, validate the target and build the spawn description
    async fn prepare(&self, snapshot: &DebugSession, request: &StartRequest) -> Result<Prepared> {
        let factory = self.registry.load_adapter(snapshot.language)?;

        if !request.dry_run {
            let report = factory.validate_environment().await;
            if !report.is_valid() {
                return Err(Error::EnvironmentInvalid(report.errors.join("; ")));
            }
            for warning in &report.warnings {
                warn!("{}", warning);
            }
        }

        if tokio::fs::metadata(&request.target).await.is_err() {
            return Err(Error::TargetNotFound(request.target.display().to_string()));
        }

        let executable = match factory
            .resolve_executable(snapshot.executable_path.as_deref())
            .await
        {
            Ok(path) => path,
            Err(_) if request.dry_run => PathBuf::from(factory.default_executable_name()),
            Err(e) => return Err(e.into()),
        };

        let launch = LaunchConfig::new(request.target.clone())
            .with_args(request.args.clone())
            .with_options(request.launch.clone());
        let launch_args = factory.transform_launch_config(&launch)?;

        let port = find_available_port(
            self.session_config.port_range_start,
            self.session_config.port_range_end,
        )
        .or_else(ephemeral_port)
        .ok_or_else(|| Error::Internal("no free port for the debug adapter".to_string()))?;

        let host = self.adapter_config.default_host.clone();
        let command = factory.build_adapter_command(
            &AdapterCommandConfig::new(executable, host.clone(), port)
                .with_cwd(launch.working_dir()),
        )?;
        let spawn = factory.policy().adapter_spawn_config(&SpawnPayload {
            executable: command.command,
            args: command.args,
            env: command.env,
            cwd: launch.working_dir(),
            host,
            port,
        });
        debug!(command = %spawn.command_line(), transport = %spawn.transport, "Backend prepared");

        Ok(Prepared {
            factory,
            launch_args,
            spawn,
        })
    }

    async fn mark_error(&self, managed: &ManagedSession) {
        managed
            .session
            .lock()
            .await
            .set_execution_state(ExecutionState::Error);
    }

    /// Apply events seen during the handshake, wait for the entry stop if one
    /// was requested, and settle on Paused or Running. Returns the receiver
    /// for the pump, or None once the session ended.
    async fn settle_initial_state(
        &self,
        managed: &Arc<ManagedSession>,
        proxy: &Arc<Proxy>,
        mut events: broadcast::Receiver<ProxyEvent>,
        stop_seen: bool,
        stop_on_entry: bool,
    ) -> Option<broadcast::Receiver<ProxyEvent>> {
        let location_timeout = self.location_timeout();
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if apply_event(managed, proxy, event, location_timeout).await == Flow::Stop {
                        return None;
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if stop_on_entry && !stop_seen && !managed.session.lock().await.is_paused() {
            let wait = Duration::from_millis(self.session_config.stop_on_entry_timeout_ms);
            let deadline = tokio::time::Instant::now() + wait;
            loop {
                let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(Ok(event)) => event,
                    Ok(Err(RecvError::Lagged(_))) => continue,
                    Ok(Err(RecvError::Closed)) => break,
                    Err(_) => {
                        debug!("No entry stop within {}ms", wait.as_millis());
                        break;
                    }
                };
                let stopped = matches!(event, ProxyEvent::Stopped(_));
                if apply_event(managed, proxy, event, location_timeout).await == Flow::Stop {
                    return None;
                }
                if stopped {
                    break;
                }
            }
        }

        let mut session = managed.session.lock().await;
        if session.execution_state() == Some(ExecutionState::Initializing) {
            session.set_execution_state(ExecutionState::Running);
        }
        Some(events)
    }
}

/// One `setBreakpoints` batch per file plus the file and ids in request order
fn breakpoint_batches(
    session: &DebugSession,
) -> (Vec<SetBreakpointsArguments>, Vec<(String, Vec<BreakpointId>)>) {
    session
        .breakpoint_files()
        .into_iter()
        .map(|file| {
            let breakpoints = session.breakpoints_for_file(&file);
            let ids = breakpoints.iter().map(|bp| bp.id.clone()).collect();
            let source = breakpoints
                .into_iter()
                .map(|bp| SourceBreakpoint::at_line(bp.line).with_condition(bp.condition))
                .collect();
            (
                SetBreakpointsArguments::for_file(file.clone(), source),
                (file, ids),
            )
        })
        .unzip()
}

async fn apply_batch_results(
    managed: &ManagedSession,
    sent: &[(String, Vec<BreakpointId>)],
    results: Vec<BreakpointBatchResult>,
) {
    let mut session = managed.session.lock().await;
    for ((_, ids), batch) in sent.iter().zip(results) {
        match batch.result {
            Ok(entries) => apply_entries(&mut session, ids, entries),
            Err(e) => warn!(file = %batch.path, "Breakpoints not applied at start: {}", e),
        }
    }
    session.touch();
}

/// Resend every file whose set changed while the handshake was running.
async fn flush_late_breakpoints(
    managed: &ManagedSession,
    proxy: &Proxy,
    sent: &[(String, Vec<BreakpointId>)],
) {
    let files = managed.session.lock().await.breakpoint_files();
    for file in files {
        let file_lock = managed.file_lock(&file);
        let _guard = file_lock.lock().await;

        let current: Vec<BreakpointId> = {
            let session = managed.session.lock().await;
            if session.is_terminated() {
                return;
            }
            session
                .breakpoints_for_file(&file)
                .into_iter()
                .map(|bp| bp.id)
                .collect()
        };
        let handshake_ids = sent
            .iter()
            .find(|(path, _)| *path == file)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or_default();
        if current.as_slice() == handshake_ids {
            continue;
        }

        debug!(file = %file, count = current.len(), "Flushing breakpoints added during start");
        if let Err(e) = sync_file(managed, proxy, &file).await {
            warn!(file = %file, "Breakpoints added during start not applied: {}", e);
        }
    }
}
