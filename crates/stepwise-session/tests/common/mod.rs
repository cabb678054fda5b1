//! Shared harness for session manager tests
//!
//! A [`SessionManager`] wired to a [`FakeBackend`] through an
//! [`InMemoryConnector`], with the mock language registered and short
//! timeouts.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::Config;
use stepwise_core::{DebugSession, OpResult, SessionId, StartOutcome};
use stepwise_dap::{AdapterRegistry, HandshakeOrder};
use stepwise_session::{SessionEvent, SessionManager, StartRequest};
use stepwise_testing::{FakeBackend, InMemoryConnector, MockAdapterFactory};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub manager: SessionManager,
    pub backend: FakeBackend,
    pub connector: Arc<InMemoryConnector>,
    pub target: NamedTempFile,
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.adapter.request_timeout_ms = 2_000;
    config.adapter.ready_timeout_ms = 2_000;
    config.adapter.shutdown_timeout_ms = 500;
    config.session.step_timeout_ms = 400;
    config.session.pause_confirm_timeout_ms = 300;
    config.session.thread_query_timeout_ms = 300;
    config.session.stop_on_entry_timeout_ms = 500;
    config.session.location_query_timeout_ms = 500;
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_factory(MockAdapterFactory::new())
    }

    pub fn deferred() -> Self {
        Self::with_factory(
            MockAdapterFactory::new().with_handshake_order(HandshakeOrder::DeferredLaunchResponse),
        )
    }

    pub fn with_factory(factory: MockAdapterFactory) -> Self {
        let backend = FakeBackend::new();
        let connector = Arc::new(InMemoryConnector::new(backend.clone()));
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(factory.into_arc());
        let manager = SessionManager::with_parts(registry, connector.clone(), &config());

        let mut target = NamedTempFile::new().expect("temp target");
        writeln!(target, "print('hello')").expect("write target");

        Self {
            manager,
            backend,
            connector,
            target,
        }
    }

    pub fn create(&self) -> DebugSession {
        self.manager
            .create_session("mock", None, None)
            .into_data()
            .expect("mock session")
    }

    pub fn request(&self) -> StartRequest {
        StartRequest::new(self.target.path())
    }

    pub async fn start(&self, id: &SessionId, request: StartRequest) -> OpResult<StartOutcome> {
        self.manager
            .start_debugging(id, request)
            .await
            .expect("no usage error")
    }

    /// Created and started, stopped on entry
    pub async fn paused_session(&self) -> DebugSession {
        let session = self.create();
        let started = self.start(&session.id, self.request().stop_on_entry()).await;
        assert!(started.success, "start failed: {:?}", started.error);
        session
    }

    /// Created and started, running
    pub async fn running_session(&self) -> DebugSession {
        let session = self.create();
        let started = self.start(&session.id, self.request()).await;
        assert!(started.success, "start failed: {:?}", started.error);
        session
    }
}

pub async fn next_event<F>(events: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("session event channel failed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}
