//! Execution control: step, continue, pause

use crate::events::SessionEvent;
use crate::managed::ManagedSession;
use crate::manager::{payload, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::{
    DebugSession, Error, ExecutionOutcome, ExecutionState, OpResult, Result, SessionId,
};
use stepwise_dap::constants::{defaults, requests};
use stepwise_dap::Proxy;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Over,
    Into,
    Out,
}

impl StepKind {
    fn command(self) -> &'static str {
        match self {
            StepKind::Over => requests::NEXT,
            StepKind::Into => requests::STEP_IN,
            StepKind::Out => requests::STEP_OUT,
        }
    }
}

/// How a wait for the next stop ended
enum WaitOutcome {
    Stopped(ExecutionOutcome),
    Terminated,
    Closed,
    TimedOut,
}

impl SessionManager {
    pub async fn step_over(&self, id: &SessionId) -> Result<OpResult<ExecutionOutcome>> {
        self.step(id, StepKind::Over).await
    }

    pub async fn step_into(&self, id: &SessionId) -> Result<OpResult<ExecutionOutcome>> {
        self.step(id, StepKind::Into).await
    }

    pub async fn step_out(&self, id: &SessionId) -> Result<OpResult<ExecutionOutcome>> {
        self.step(id, StepKind::Out).await
    }

    #[instrument(skip(self), fields(session = %id))]
    async fn step(&self, id: &SessionId, kind: StepKind) -> Result<OpResult<ExecutionOutcome>> {
        let (managed, snapshot) = self.live(id).await?;
        let result = self.step_inner(&managed, snapshot, kind).await;
        Ok(payload(kind.command(), id, result))
    }

    async fn step_inner(
        &self,
        managed: &Arc<ManagedSession>,
        snapshot: DebugSession,
        kind: StepKind,
    ) -> Result<ExecutionOutcome> {
        let (proxy, thread_id) = paused_thread(managed, &snapshot).await?;
        let command = kind.command();

        let mut events = managed.subscribe();
        resume(managed, &proxy, command, thread_id, &snapshot).await?;

        let timeout = self.step_timeout();
        match wait_for_stop(&mut events, managed, timeout).await {
            WaitOutcome::Stopped(outcome) => Ok(outcome),
            WaitOutcome::Terminated => {
                Ok(ExecutionOutcome::new(ExecutionState::Terminated).with_reason("terminated"))
            }
            WaitOutcome::Closed => Err(Error::DebuggerError(format!(
                "connection closed during '{}'",
                command
            ))),
            WaitOutcome::TimedOut => Err(Error::timeout(
                format!("stop after '{}'", command),
                self.session_config.step_timeout_ms,
            )),
        }
    }

    /// Resume a paused session
    #[instrument(skip(self), fields(session = %id))]
    pub async fn continue_execution(&self, id: &SessionId) -> Result<OpResult<ExecutionOutcome>> {
        let (managed, snapshot) = self.live(id).await?;
        let result: Result<ExecutionOutcome> = async {
            let (proxy, thread_id) = paused_thread(&managed, &snapshot).await?;
            resume(&managed, &proxy, requests::CONTINUE, thread_id, &snapshot).await?;
            Ok(ExecutionOutcome::new(ExecutionState::Running))
        }
        .await;
        Ok(payload("continue", id, result))
    }

    /// Interrupt a running session. Already paused: no backend calls.
    #[instrument(skip(self), fields(session = %id))]
    pub async fn pause(&self, id: &SessionId) -> Result<OpResult<ExecutionOutcome>> {
        let (managed, snapshot) = self.live(id).await?;
        let result = self.pause_inner(&managed, snapshot).await;
        Ok(payload("pause", id, result))
    }

    async fn pause_inner(
        &self,
        managed: &Arc<ManagedSession>,
        snapshot: DebugSession,
    ) -> Result<ExecutionOutcome> {
        if snapshot.is_paused() {
            return Ok(ExecutionOutcome::new(ExecutionState::Paused)
                .with_location(snapshot.current_location));
        }
        if !snapshot.is_active() {
            return Err(Error::ProxyNotRunning(format!(
                "session {} has not been started",
                snapshot.id
            )));
        }
        let proxy = managed.running_proxy().await?;
        let thread_id = self.pause_thread(&proxy).await;

        let mut events = managed.subscribe();
        proxy
            .thread_command(requests::PAUSE, thread_id)
            .await
            .map_err(Error::from)?;

        let timeout = Duration::from_millis(self.session_config.pause_confirm_timeout_ms);
        match wait_for_stop(&mut events, managed, timeout).await {
            WaitOutcome::Stopped(outcome) => Ok(outcome),
            WaitOutcome::Terminated => Ok(ExecutionOutcome::new(ExecutionState::Terminated)),
            WaitOutcome::Closed => Err(Error::DebuggerError(
                "connection closed during 'pause'".to_string(),
            )),
            WaitOutcome::TimedOut => {
                debug!("Pause not confirmed within {}ms", timeout.as_millis());
                let session = managed.session.lock().await;
                let state = session
                    .execution_state()
                    .unwrap_or(ExecutionState::Terminated);
                Ok(ExecutionOutcome::new(state).with_location(session.current_location.clone()))
            }
        }
    }

    /// Thread to pause: the cached stop thread if listed, else the first.
    /// Falls back to thread 1 when the query fails.
    async fn pause_thread(&self, proxy: &Proxy) -> i64 {
        let timeout = Duration::from_millis(self.session_config.thread_query_timeout_ms);
        let cached = proxy.current_thread_id().await;
        match tokio::time::timeout(timeout, proxy.threads()).await {
            Ok(Ok(threads)) if !threads.is_empty() => cached
                .filter(|id| threads.iter().any(|t| t.id == *id))
                .unwrap_or(threads[0].id),
            Ok(Ok(_)) => {
                warn!("Backend reported no threads; pausing thread {}", defaults::THREAD_ID);
                defaults::THREAD_ID
            }
            Ok(Err(e)) => {
                warn!("Threads query failed ({}); pausing thread {}", e, defaults::THREAD_ID);
                defaults::THREAD_ID
            }
            Err(_) => {
                warn!(
                    "Threads query timed out after {}ms; pausing thread {}",
                    timeout.as_millis(),
                    defaults::THREAD_ID
                );
                defaults::THREAD_ID
            }
        }
    }
}

/// Proxy and stop thread of a paused session
async fn paused_thread(
    managed: &ManagedSession,
    snapshot: &DebugSession,
) -> Result<(Arc<Proxy>, i64)> {
    if !snapshot.is_paused() {
        return Err(Error::NotPaused(snapshot.id.to_string()));
    }
    let proxy = managed.running_proxy().await?;
    let thread_id = proxy
        .current_thread_id()
        .await
        .ok_or_else(|| Error::ProxyNotRunning("no stopped thread is known".to_string()))?;
    Ok((proxy, thread_id))
}

/// Move to Running, then send a resuming command. A rejected request
/// restores the previous stop.
async fn resume(
    managed: &ManagedSession,
    proxy: &Proxy,
    command: &str,
    thread_id: i64,
    snapshot: &DebugSession,
) -> Result<()> {
    managed
        .session
        .lock()
        .await
        .set_execution_state(ExecutionState::Running);

    if let Err(e) = proxy.thread_command(command, thread_id).await {
        let mut session = managed.session.lock().await;
        if session.execution_state() == Some(ExecutionState::Running) {
            session.mark_paused(snapshot.current_location.clone());
        }
        return Err(e.into());
    }
    Ok(())
}

/// Wait for the pump to apply the next stop or termination
async fn wait_for_stop(
    events: &mut broadcast::Receiver<SessionEvent>,
    managed: &ManagedSession,
    timeout: Duration,
) -> WaitOutcome {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Err(_) => return WaitOutcome::TimedOut,
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(_))) => {
                let session = managed.session.lock().await;
                if session.is_terminated() {
                    return WaitOutcome::Terminated;
                }
                if session.is_paused() {
                    return WaitOutcome::Stopped(
                        ExecutionOutcome::new(ExecutionState::Paused)
                            .with_location(session.current_location.clone()),
                    );
                }
                continue;
            }
            Ok(Err(RecvError::Closed)) => return WaitOutcome::Closed,
        };
        match event {
            SessionEvent::Stopped {
                reason, location, ..
            } => {
                return WaitOutcome::Stopped(
                    ExecutionOutcome::new(ExecutionState::Paused)
                        .with_location(location)
                        .with_reason(reason),
                )
            }
            SessionEvent::Terminated { .. } => return WaitOutcome::Terminated,
            SessionEvent::TransportClosed => return WaitOutcome::Closed,
            SessionEvent::Continued { .. } | SessionEvent::Output(_) => {}
        }
    }
}
