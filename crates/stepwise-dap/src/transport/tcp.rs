//! TCP helpers: connect with backoff, keepalive, host normalization.

use crate::{Error, Result};
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use stepwise_config::DEFAULT_TCP_KEEPALIVE_RETRIES;
use stepwise_config::{
    AdapterConnectionConfig, DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS,
    DEFAULT_TCP_KEEPALIVE_TIME_SECS, LOCALHOST_IPV4,
};
use socket2::{SockRef, TcpKeepalive};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Parse a host, mapping "localhost" to 127.0.0.1 so we never race IPv6
pub fn resolve_host(host: &str) -> Ipv4Addr {
    if host == "localhost" {
        return LOCALHOST_IPV4;
    }
    match host.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid host '{}': {}. Falling back to 127.0.0.1", host, e);
            LOCALHOST_IPV4
        }
    }
}

/// Connect with exponential backoff and jitter.
///
/// The interval starts at `retry_interval_ms` and doubles up to
/// `backoff.max_delay_ms`. Fails fast after `max_connection_refused_attempts`
/// consecutive refusals, and after `connection_timeout_ms` overall.
pub async fn connect_with_retry(
    host: Ipv4Addr,
    port: u16,
    config: &AdapterConnectionConfig,
) -> Result<TcpStream> {
    use rand::Rng;

    let address = format!("{}:{}", host, port);
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(config.connection_timeout_ms);

    let mut retry_interval_ms = config.retry_interval_ms;
    let mut attempt = 0u32;
    let mut refused = 0u32;

    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                debug!(attempts = attempt + 1, "Connected to {}", address);
                return Ok(stream);
            }
            Err(e) => {
                attempt += 1;

                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    refused += 1;
                    if refused >= config.max_connection_refused_attempts {
                        return Err(Error::Communication(format!(
                            "Nothing listening on {} (connection refused {} times)",
                            address, refused
                        )));
                    }
                } else {
                    refused = 0;
                }

                if start.elapsed() > timeout {
                    return Err(Error::Communication(format!(
                        "Timeout connecting to {} after {} attempts: {}",
                        address, attempt, e
                    )));
                }

                let jitter_ms = if config.backoff.jitter_ms > 0 {
                    rand::rng().random_range(0..config.backoff.jitter_ms)
                } else {
                    0
                };
                let wait_ms = retry_interval_ms.saturating_add(jitter_ms);
                trace!(
                    "Connect attempt {} failed, retrying in {}ms ({}ms + {}ms jitter)",
                    attempt,
                    wait_ms,
                    retry_interval_ms,
                    jitter_ms
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;

                retry_interval_ms = retry_interval_ms
                    .saturating_mul(2)
                    .min(config.backoff.max_delay_ms);
            }
        }
    }
}

/// Disable Nagle and enable keepalive so idle debug sessions stay connected
pub fn configure_tcp_keepalive(stream: &TcpStream) {
    let socket = SockRef::from(stream);

    if let Err(e) = socket.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_TIME_SECS))
        .with_interval(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS));

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let keepalive = keepalive.with_retries(DEFAULT_TCP_KEEPALIVE_RETRIES);

    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keep-alive: {}", e);
    }
}
