//! Transport/Process Channel
//!
//! A [`SpawnConfig`] describes how to start one backend process and which
//! byte channel to talk to it over. A [`TransportConnector`] turns it into a
//! [`TransportChannel`]. The production connector is [`ProcessConnector`];
//! tests substitute an in-memory one.

mod process;
mod tcp;

pub use process::ProcessConnector;
pub use tcp::{configure_tcp_keepalive, connect_with_retry, resolve_host};

use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

/// Placeholder replaced by the allocated port in spawn arguments
pub const PORT_PLACEHOLDER: &str = "{port}";

/// How bytes reach the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// DAP over the process's stdin/stdout
    Stdio,
    /// The process listens on `host:port`; we connect (with retry)
    TcpConnect { host: String, port: u16 },
    /// We listen on `host:port`; the process connects back to us
    TcpListen { host: String, port: u16 },
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::TcpConnect { .. } => "tcp-connect",
            TransportKind::TcpListen { .. } => "tcp-listen",
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            TransportKind::Stdio => None,
            TransportKind::TcpConnect { port, .. } | TransportKind::TcpListen { port, .. } => {
                Some(*port)
            }
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => f.write_str("stdio"),
            TransportKind::TcpConnect { host, port } => write!(f, "tcp-connect {}:{}", host, port),
            TransportKind::TcpListen { host, port } => write!(f, "tcp-listen {}:{}", host, port),
        }
    }
}

/// Process and channel description produced by a backend policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub transport: TransportKind,
}

impl SpawnConfig {
    pub fn new(command: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            transport,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Arguments with `{port}` replaced by the transport port
    pub fn resolved_args(&self) -> Vec<String> {
        match self.transport.port() {
            Some(port) => self
                .args
                .iter()
                .map(|arg| arg.replace(PORT_PLACEHOLDER, &port.to_string()))
                .collect(),
            None => self.args.clone(),
        }
    }

    /// Shell-like rendering for dry runs and logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.clone())
            .chain(self.resolved_args())
            .map(|part| quote_arg(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open channel to a backend, plus the process behind it (if we own one)
pub struct TransportChannel {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub process: Option<Child>,
}

impl TransportChannel {
    pub fn new<R, W>(reader: R, writer: W, process: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process,
        }
    }
}

impl fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportChannel")
            .field("process", &self.process.as_ref().and_then(|p| p.id()))
            .finish_non_exhaustive()
    }
}

/// Opens channels to backends
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Spawn the process described by `spawn` and connect to it
    async fn open(&self, spawn: &SpawnConfig) -> Result<TransportChannel>;

    /// Open an additional connection to an already running backend, used for
    /// child sessions
    async fn open_child(&self, host: &str, port: u16) -> Result<TransportChannel>;
}
