//! Per-session runtime state held in the session table

use crate::events::SessionEvent;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use stepwise_core::{DebugSession, Error, OutputLine, Result, SessionId};
use stepwise_dap::Proxy;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

pub(crate) struct ManagedSession {
    pub(crate) id: SessionId,
    pub(crate) session: Mutex<DebugSession>,
    proxy: RwLock<Option<Arc<Proxy>>>,
    /// Serializes breakpoint batches per file
    file_locks: DashMap<String, Arc<Mutex<()>>>,
    output: Mutex<VecDeque<OutputLine>>,
    output_capacity: usize,
    events: broadcast::Sender<SessionEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ManagedSession {
    pub(crate) fn new(session: DebugSession, output_capacity: usize, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            id: session.id.clone(),
            session: Mutex::new(session),
            proxy: RwLock::new(None),
            file_locks: DashMap::new(),
            output: Mutex::new(VecDeque::new()),
            output_capacity,
            events,
            pump: Mutex::new(None),
        }
    }

    /// Snapshot of the session, failing with `SessionTerminated` once it ended
    pub(crate) async fn ensure_live(&self) -> Result<DebugSession> {
        let session = self.session.lock().await;
        if session.is_terminated() {
            return Err(Error::SessionTerminated(self.id.to_string()));
        }
        Ok(session.clone())
    }

    pub(crate) async fn proxy(&self) -> Option<Arc<Proxy>> {
        self.proxy.read().await.clone()
    }

    /// The proxy, if it still has a live transport
    pub(crate) async fn running_proxy(&self) -> Result<Arc<Proxy>> {
        let proxy = self
            .proxy()
            .await
            .ok_or_else(|| Error::ProxyNotRunning(format!("session {} has no debugger", self.id)))?;
        if !proxy.is_running().await {
            return Err(Error::ProxyNotRunning(format!(
                "debugger for session {} is not running",
                self.id
            )));
        }
        Ok(proxy)
    }

    pub(crate) async fn set_proxy(&self, proxy: Arc<Proxy>) {
        *self.proxy.write().await = Some(proxy);
    }

    pub(crate) async fn take_proxy(&self) -> Option<Arc<Proxy>> {
        self.proxy.write().await.take()
    }

    pub(crate) fn file_lock(&self, file: &str) -> Arc<Mutex<()>> {
        self.file_locks
            .entry(file.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) async fn push_output(&self, line: OutputLine) {
        if self.output_capacity == 0 {
            return;
        }
        let mut output = self.output.lock().await;
        while output.len() >= self.output_capacity {
            output.pop_front();
        }
        output.push_back(line);
    }

    pub(crate) async fn output(&self) -> Vec<OutputLine> {
        self.output.lock().await.iter().cloned().collect()
    }

    pub(crate) async fn set_pump(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.pump.lock().await.replace(handle) {
            old.abort();
        }
    }

    pub(crate) async fn stop_pump(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
    }
}
