//! Event pump: applies backend events to session state, then republishes them

use crate::managed::ManagedSession;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use stepwise_core::{ExecutionState, OutputLine, SourceLocation};
use stepwise_dap::constants::output_categories;
use stepwise_dap::{DebugResult, Proxy, ProxyEvent, StoppedEventBody};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A backend event after it was applied to the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Stopped {
        reason: String,
        thread_id: Option<i64>,
        location: Option<SourceLocation>,
    },
    #[serde(rename_all = "camelCase")]
    Continued { thread_id: Option<i64> },
    #[serde(rename_all = "camelCase")]
    Terminated { exit_code: Option<i64> },
    Output(OutputLine),
    /// The backend connection dropped without a termination event
    TransportClosed,
}

/// What the pump should do after applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

pub(crate) fn spawn_pump(
    managed: Weak<ManagedSession>,
    proxy: Arc<Proxy>,
    mut events: broadcast::Receiver<ProxyEvent>,
    location_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session event pump lagged, {} backend event(s) dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(managed) = managed.upgrade() else {
                break;
            };
            if apply_event(&managed, &proxy, event, location_timeout).await == Flow::Stop {
                break;
            }
        }
        trace!("Session event pump stopped");
    })
}

/// Apply one backend event to the session and publish the result
pub(crate) async fn apply_event(
    managed: &ManagedSession,
    proxy: &Arc<Proxy>,
    event: ProxyEvent,
    location_timeout: Duration,
) -> Flow {
    match event {
        ProxyEvent::Stopped(body) => {
            apply_stop(managed, proxy, body, location_timeout).await;
            Flow::Continue
        }
        ProxyEvent::Continued { thread_id } => {
            if managed
                .session
                .lock()
                .await
                .set_execution_state(ExecutionState::Running)
            {
                managed.publish(SessionEvent::Continued { thread_id });
            }
            Flow::Continue
        }
        ProxyEvent::Terminated => {
            terminate(managed, proxy, None).await;
            Flow::Stop
        }
        ProxyEvent::Exited { exit_code } => {
            terminate(managed, proxy, Some(exit_code)).await;
            Flow::Stop
        }
        ProxyEvent::Output(body) => {
            let category = body
                .category
                .unwrap_or_else(|| output_categories::CONSOLE.to_string());
            if category == output_categories::TELEMETRY {
                return Flow::Continue;
            }
            let line = OutputLine {
                category,
                text: body.output,
            };
            managed.push_output(line.clone()).await;
            managed.publish(SessionEvent::Output(line));
            Flow::Continue
        }
        ProxyEvent::Closed => {
            let errored = managed
                .session
                .lock()
                .await
                .set_execution_state(ExecutionState::Error);
            if errored {
                warn!(session = %managed.id, "Debugger connection closed unexpectedly");
                managed.publish(SessionEvent::TransportClosed);
            }
            Flow::Stop
        }
        ProxyEvent::Initialized | ProxyEvent::Other(_) => Flow::Continue,
    }
}

async fn apply_stop(
    managed: &ManagedSession,
    proxy: &Arc<Proxy>,
    body: StoppedEventBody,
    location_timeout: Duration,
) {
    let thread_id = match body.thread_id {
        Some(id) => Some(id),
        None => proxy.current_thread_id().await,
    };
    let location = match thread_id {
        Some(thread_id) => top_frame_location(proxy, thread_id, location_timeout).await,
        None => None,
    };
    let paused = managed.session.lock().await.mark_paused(location.clone());
    if paused {
        debug!(session = %managed.id, reason = %body.reason, ?location, "Stopped");
        managed.publish(SessionEvent::Stopped {
            reason: body.reason,
            thread_id,
            location,
        });
    }
}

/// Location of the top frame, bounded by `timeout`
pub(crate) async fn top_frame_location(
    proxy: &Proxy,
    thread_id: i64,
    timeout: Duration,
) -> Option<SourceLocation> {
    let frames = tokio::time::timeout(timeout, proxy.stack_trace(thread_id, 1))
        .await
        .debug_ok("Stop location query")?
        .debug_ok("Could not locate stop")?;
    let frame = frames.first()?;
    let file = frame.source_path()?.to_string();
    let line = u32::try_from(frame.line).ok().filter(|line| *line > 0)?;
    Some(SourceLocation { file, line })
}

async fn terminate(managed: &ManagedSession, proxy: &Arc<Proxy>, exit_code: Option<i64>) {
    {
        let mut session = managed.session.lock().await;
        if session.is_terminated() {
            return;
        }
        session.terminate();
    }
    info!(session = %managed.id, ?exit_code, "Debuggee terminated");
    managed.publish(SessionEvent::Terminated { exit_code });

    let proxy = proxy.clone();
    tokio::spawn(async move {
        if let Err(e) = proxy.shutdown().await {
            debug!("Background debugger shutdown failed: {}", e);
        }
    });
}
