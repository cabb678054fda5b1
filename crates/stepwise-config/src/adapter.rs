//! Debug adapter connection configuration
//!
//! Timeouts and retry behavior for spawning backends and talking to them.

use crate::constants::{
    DEFAULT_ADAPTER_HOST, DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS, DEFAULT_MAX_RETRY_DELAY_MS,
    DEFAULT_READY_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_RETRY_JITTER_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Adapter Connection Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConnectionConfig {
    /// Host adapters listen on or connect back to
    #[serde(default = "default_adapter_host")]
    pub default_host: String,
    /// Time allowed to establish the transport (ms)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Grace period for disconnect before the process is killed (ms)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Initial retry interval when connecting (ms)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Consecutive "connection refused" results before fast-fail
    #[serde(default = "default_max_connection_refused_attempts")]
    pub max_connection_refused_attempts: u32,
    /// Per-request response timeout (ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Wait for the backend ready signal during the handshake (ms)
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Capacity of event channels in the DAP broker
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_adapter_host() -> String {
    DEFAULT_ADAPTER_HOST.to_string()
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_max_connection_refused_attempts() -> u32 {
    DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for AdapterConnectionConfig {
    fn default() -> Self {
        AdapterConnectionConfig {
            default_host: default_adapter_host(),
            connection_timeout_ms: default_connection_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            max_connection_refused_attempts: default_max_connection_refused_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl AdapterConnectionConfig {
    /// Problems with this section, prefixed with `adapter.`
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let positive = [
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
            ("retry_interval_ms", self.retry_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("ready_timeout_ms", self.ready_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                errors.push(format!("adapter.{} must be greater than 0", name));
            }
        }
        if self.event_channel_capacity == 0 {
            errors.push("adapter.event_channel_capacity must be greater than 0".to_string());
        }
        if self.max_connection_refused_attempts == 0 {
            errors.push("adapter.max_connection_refused_attempts must be greater than 0".to_string());
        }
        if self.backoff.max_delay_ms < self.retry_interval_ms {
            errors.push(format!(
                "adapter.backoff.max_delay_ms ({}) must be >= adapter.retry_interval_ms ({})",
                self.backoff.max_delay_ms, self.retry_interval_ms
            ));
        }
        errors
    }
}

// ============================================================================
// Backoff Config
// ============================================================================

/// Exponential backoff for connect retries: the interval doubles from
/// `retry_interval_ms` up to `max_delay_ms`, plus `0..jitter_ms` random jitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_MS
}

fn default_jitter_ms() -> u64 {
    DEFAULT_RETRY_JITTER_MS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}
