//! SessionManager - session table and lifecycle operations
//!
//! The table is the only structure shared across sessions. Operations on
//! one session never block another: each entry carries its own locks,
//! proxy and event channel.

use crate::events::SessionEvent;
use crate::managed::ManagedSession;
use dashmap::DashMap;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::{AdapterConnectionConfig, Config, SessionConfig};
use stepwise_core::{
    Breakpoint, CloseOutcome, DebugLanguage, DebugSession, Error, OpResult, OutputLine, Result,
    SessionId, SessionSummary,
};
use stepwise_dap::{AdapterRegistry, ProcessConnector, TransportConnector};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

pub struct SessionManager {
    pub(crate) sessions: DashMap<SessionId, Arc<ManagedSession>>,
    pub(crate) registry: Arc<AdapterRegistry>,
    pub(crate) connector: Arc<dyn TransportConnector>,
    pub(crate) adapter_config: AdapterConnectionConfig,
    pub(crate) session_config: SessionConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager with the builtin adapters, spawning real processes
    pub fn new(config: &Config) -> Self {
        let connector = Arc::new(ProcessConnector::new(config.adapter.clone()));
        Self::with_parts(Arc::new(AdapterRegistry::new()), connector, config)
    }

    /// Manager with an explicit registry and transport connector
    pub fn with_parts(
        registry: Arc<AdapterRegistry>,
        connector: Arc<dyn TransportConnector>,
        config: &Config,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            connector,
            adapter_config: config.adapter.clone(),
            session_config: config.session.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Languages the registry can currently load
    pub fn supported_languages(&self) -> Vec<DebugLanguage> {
        DebugLanguage::ALL
            .iter()
            .copied()
            .filter(|language| self.registry.load_adapter(*language).is_ok())
            .collect()
    }

    /// Entry for `id`, or `SessionNotFound`
    pub(crate) fn entry(&self, id: &SessionId) -> Result<Arc<ManagedSession>> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Entry for a session that has not terminated
    pub(crate) async fn live(&self, id: &SessionId) -> Result<(Arc<ManagedSession>, DebugSession)> {
        let managed = self.entry(id)?;
        let snapshot = managed.ensure_live().await?;
        Ok((managed, snapshot))
    }

    pub(crate) fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.session_config.step_timeout_ms)
    }

    pub(crate) fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.session_config.location_query_timeout_ms)
    }

    /// Register a new session in the Created state
    #[instrument(skip(self, executable_path))]
    pub fn create_session(
        &self,
        language: &str,
        name: Option<String>,
        executable_path: Option<PathBuf>,
    ) -> OpResult<DebugSession> {
        let language: DebugLanguage = match language.parse() {
            Ok(language) => language,
            Err(_) => {
                let err = Error::InvalidLanguage(DebugLanguage::language_error(language));
                warn!("create_session failed: {}", err);
                return OpResult::failure(&err);
            }
        };
        let session = DebugSession::new(language, name, executable_path);
        let managed = ManagedSession::new(
            session.clone(),
            self.session_config.output_buffer_lines,
            self.session_config.event_capacity,
        );
        self.sessions.insert(session.id.clone(), Arc::new(managed));
        info!(session = %session.id, name = %session.name, "Session created");
        OpResult::ok(session)
    }

    /// Remove the session, stop its pump and shut its debugger down.
    /// Unknown ids succeed with `closed = false`.
    #[instrument(skip(self), fields(session = %id))]
    pub async fn close_session(&self, id: &SessionId) -> OpResult<CloseOutcome> {
        let Some((_, managed)) = self.sessions.remove(id) else {
            debug!("close_session: no such session");
            return OpResult::ok(CloseOutcome { closed: false });
        };

        managed.stop_pump().await;
        if let Some(proxy) = managed.take_proxy().await {
            if let Err(e) = proxy.shutdown().await {
                warn!("Debugger shutdown failed: {}", e);
            }
        }

        let was_live = {
            let mut session = managed.session.lock().await;
            let was_live = !session.is_terminated();
            session.terminate();
            was_live
        };
        if was_live {
            managed.publish(SessionEvent::Terminated { exit_code: None });
        }
        info!("Session closed");
        OpResult::ok(CloseOutcome { closed: true })
    }

    /// Close every session concurrently; returns how many were closed
    pub async fn close_all_sessions(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let results = join_all(ids.iter().map(|id| self.close_session(id))).await;
        let closed = results
            .iter()
            .filter(|result| result.data().is_some_and(|outcome| outcome.closed))
            .count();
        info!("Closed {} session(s)", closed);
        closed
    }

    /// Snapshot of one session. Readable after termination.
    pub async fn get_session(&self, id: &SessionId) -> Result<DebugSession> {
        let managed = self.entry(id)?;
        let session = managed.session.lock().await.clone();
        Ok(session)
    }

    /// Summaries of every session, oldest first
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let entries: Vec<Arc<ManagedSession>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut summaries = Vec::with_capacity(entries.len());
        for managed in entries {
            summaries.push(SessionSummary::from(&*managed.session.lock().await));
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    /// Breakpoints sorted by file, line, then creation order
    pub async fn list_breakpoints(&self, id: &SessionId) -> Result<Vec<Breakpoint>> {
        let managed = self.entry(id)?;
        let breakpoints = managed.session.lock().await.sorted_breakpoints();
        Ok(breakpoints)
    }

    /// Captured program output, oldest first
    pub async fn get_output(&self, id: &SessionId) -> Result<Vec<OutputLine>> {
        let managed = self.entry(id)?;
        Ok(managed.output().await)
    }

    /// Events applied to the session from now on
    pub async fn subscribe(&self, id: &SessionId) -> Result<broadcast::Receiver<SessionEvent>> {
        let (managed, _) = self.live(id).await?;
        Ok(managed.subscribe())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Convert an internal result into a payload, logging failures
pub(crate) fn payload<T>(operation: &str, session: &SessionId, result: Result<T>) -> OpResult<T> {
    if let Err(e) = &result {
        warn!(%session, code = e.code().as_u16(), "{} failed: {}", operation, e);
    }
    OpResult::from(result)
}
