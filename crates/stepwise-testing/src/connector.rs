//! In-memory transport connector

use crate::FakeBackend;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use stepwise_dap::{Error, Result, SpawnConfig, TransportChannel, TransportConnector};

/// Connects proxies to a [`FakeBackend`] and records what would have been
/// spawned
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    backend: FakeBackend,
    child: Option<FakeBackend>,
    failure: Mutex<Option<Error>>,
    spawns: Mutex<Vec<SpawnConfig>>,
    child_connects: Mutex<Vec<(String, u16)>>,
}

impl InMemoryConnector {
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Serve child-session connections from `child`
    pub fn with_child(mut self, child: FakeBackend) -> Self {
        self.child = Some(child);
        self
    }

    /// Fail the next `open` with `error`
    pub fn fail_next(&self, error: Error) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn backend(&self) -> &FakeBackend {
        &self.backend
    }

    /// Every spawn requested so far
    pub fn spawns(&self) -> Vec<SpawnConfig> {
        self.spawns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn child_connects(&self) -> Vec<(String, u16)> {
        self.child_connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TransportConnector for InMemoryConnector {
    async fn open(&self, spawn: &SpawnConfig) -> Result<TransportChannel> {
        self.spawns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spawn.clone());
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(error) = failure {
            return Err(error);
        }
        let (reader, writer) = self.backend.connect();
        Ok(TransportChannel::new(reader, writer, None))
    }

    async fn open_child(&self, host: &str, port: u16) -> Result<TransportChannel> {
        self.child_connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((host.to_string(), port));
        let child = self
            .child
            .as_ref()
            .ok_or_else(|| Error::Communication(format!("Nothing listening on {}:{}", host, port)))?;
        let (reader, writer) = child.connect();
        Ok(TransportChannel::new(reader, writer, None))
    }
}
