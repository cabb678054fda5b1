//! Spawning backend processes and opening their channels

use super::tcp::{configure_tcp_keepalive, connect_with_retry, resolve_host};
use super::{SpawnConfig, TransportChannel, TransportConnector, TransportKind};
use crate::{Error, Result};
use async_trait::async_trait;
use stepwise_config::AdapterConnectionConfig;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Spawns real processes. One instance is shared by every session.
#[derive(Debug, Clone, Default)]
pub struct ProcessConnector {
    config: AdapterConnectionConfig,
}

impl ProcessConnector {
    pub fn new(config: AdapterConnectionConfig) -> Self {
        Self { config }
    }

    fn command(spawn: &SpawnConfig) -> Command {
        let mut cmd = Command::new(&spawn.command);
        cmd.args(spawn.resolved_args()).kill_on_drop(true);
        if let Some(cwd) = &spawn.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spawn.env {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn(spawn: &SpawnConfig, mut cmd: Command) -> Result<Child> {
        info!("Spawning backend: {}", spawn.command_line());
        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ExecutableNotFound(spawn.command.clone())
            } else {
                Error::Communication(format!("Failed to spawn '{}': {}", spawn.command, e))
            }
        })
    }

    async fn open_stdio(&self, spawn: &SpawnConfig) -> Result<TransportChannel> {
        let mut cmd = Self::command(spawn);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = Self::spawn(spawn, cmd)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Communication("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Communication("Failed to get stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            drain_to_log(stderr, spawn.command.clone());
        }

        Ok(TransportChannel::new(stdout, stdin, Some(child)))
    }

    async fn open_tcp_connect(
        &self,
        spawn: &SpawnConfig,
        host: &str,
        port: u16,
    ) -> Result<TransportChannel> {
        let mut child = self.spawn_detached_io(spawn)?;

        // Fail early when the process dies before it starts listening
        let connect = connect_with_retry(resolve_host(host), port, &self.config);
        let stream = tokio::select! {
            stream = connect => stream,
            status = child.wait() => {
                let status = status.map_err(Error::from)?;
                return Err(Error::Communication(format!(
                    "'{}' exited before accepting a connection ({})",
                    spawn.command, status
                )));
            }
        }?;
        configure_tcp_keepalive(&stream);

        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportChannel::new(reader, writer, Some(child)))
    }

    async fn open_tcp_listen(
        &self,
        spawn: &SpawnConfig,
        host: &str,
        port: u16,
    ) -> Result<TransportChannel> {
        let address = format!("{}:{}", resolve_host(host), port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| Error::Communication(format!("Failed to listen on {}: {}", address, e)))?;
        debug!("Listening for backend on {}", address);

        let mut child = self.spawn_detached_io(spawn)?;
        let timeout = Duration::from_millis(self.config.connection_timeout_ms);

        let accepted = tokio::select! {
            accepted = tokio::time::timeout(timeout, listener.accept()) => accepted,
            status = child.wait() => {
                let status = status.map_err(Error::from)?;
                return Err(Error::Communication(format!(
                    "'{}' exited before connecting ({})",
                    spawn.command, status
                )));
            }
        };
        let stream = match accepted {
            Ok(Ok((stream, peer))) => {
                debug!("Backend connected from {}", peer);
                stream
            }
            Ok(Err(e)) => return Err(Error::Communication(format!("Accept failed: {}", e))),
            Err(_) => {
                let _ = child.start_kill();
                return Err(Error::Communication(format!(
                    "'{}' did not connect to {} within {}ms",
                    spawn.command, address, self.config.connection_timeout_ms
                )));
            }
        };
        configure_tcp_keepalive(&stream);

        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportChannel::new(reader, writer, Some(child)))
    }

    /// Spawn for TCP transports: stdin closed, stdout/stderr forwarded to logs
    fn spawn_detached_io(&self, spawn: &SpawnConfig) -> Result<Child> {
        let mut cmd = Self::command(spawn);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = Self::spawn(spawn, cmd)?;
        if let Some(stdout) = child.stdout.take() {
            drain_to_log(stdout, spawn.command.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            drain_to_log(stderr, spawn.command.clone());
        }
        Ok(child)
    }
}

#[async_trait]
impl TransportConnector for ProcessConnector {
    async fn open(&self, spawn: &SpawnConfig) -> Result<TransportChannel> {
        match &spawn.transport {
            TransportKind::Stdio => self.open_stdio(spawn).await,
            TransportKind::TcpConnect { host, port } => {
                self.open_tcp_connect(spawn, host, *port).await
            }
            TransportKind::TcpListen { host, port } => {
                self.open_tcp_listen(spawn, host, *port).await
            }
        }
    }

    async fn open_child(&self, host: &str, port: u16) -> Result<TransportChannel> {
        let stream = connect_with_retry(resolve_host(host), port, &self.config).await?;
        configure_tcp_keepalive(&stream);
        let (reader, writer) = tokio::io::split(stream);
        Ok(TransportChannel::new(reader, writer, None))
    }
}

/// Forward a process stream to debug logs line by line
fn drain_to_log<R>(stream: R, source: String)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(target: "stepwise_dap::backend", source = %source, "{}", line),
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading output of '{}': {}", source, e);
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_executable_is_reported() {
        let connector = ProcessConnector::default();
        let spawn = SpawnConfig::new("stepwise-no-such-binary-1f3a", TransportKind::Stdio);
        let err = connector.open(&spawn).await.unwrap_err();
        assert!(matches!(err, Error::ExecutableNotFound(_)), "got {:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_channel_round_trips_bytes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let connector = ProcessConnector::default();
        let spawn = SpawnConfig::new("cat", TransportKind::Stdio);
        let mut channel = connector.open(&spawn).await.unwrap();

        channel.writer.write_all(b"ping").await.unwrap();
        channel.writer.flush().await.unwrap();
        let mut buf = [0u8; 4];
        channel.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let mut child = channel.process.take().unwrap();
        child.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listen_fails_early_when_process_exits() {
        let port = stepwise_config::ephemeral_port().unwrap();
        let connector = ProcessConnector::default();
        let spawn = SpawnConfig::new(
            "true",
            TransportKind::TcpListen {
                host: "127.0.0.1".into(),
                port,
            },
        );
        let started = std::time::Instant::now();
        let err = connector.open(&spawn).await.unwrap_err();
        assert!(err.to_string().contains("exited before connecting"), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
