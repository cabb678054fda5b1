//! Default values for every configuration field

// ============================================================================
// Network
// ============================================================================

/// Host adapters listen on or connect back to
pub const DEFAULT_ADAPTER_HOST: &str = "127.0.0.1";

/// IPv4 loopback, used when a configured host is "localhost" or unparseable
pub const LOCALHOST_IPV4: std::net::Ipv4Addr = std::net::Ipv4Addr::new(127, 0, 0, 1);

/// First port tried when allocating a backend port
pub const DEFAULT_PORT_RANGE_START: u16 = 38_000;

/// Last port tried when allocating a backend port
pub const DEFAULT_PORT_RANGE_END: u16 = 38_999;

// ============================================================================
// Adapter connection
// ============================================================================

/// Time allowed to establish the transport to a freshly spawned backend
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// Grace period for the disconnect request before the process is killed
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 3_000;

/// Per-request response timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Initial retry interval while connecting to a backend port
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Upper bound for the connect retry interval
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 1_000;

/// Random jitter added to each connect retry
pub const DEFAULT_RETRY_JITTER_MS: u64 = 100;

/// Consecutive "connection refused" results tolerated before giving up.
/// Freshly spawned backends need a moment to bind their port.
pub const DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS: u32 = 50;

/// Wait for the backend's ready ("initialized") signal
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Capacity of broker event channels
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1_000;

pub const DEFAULT_TCP_KEEPALIVE_TIME_SECS: u64 = 10;
pub const DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TCP_KEEPALIVE_RETRIES: u32 = 3;

// ============================================================================
// Session
// ============================================================================

/// Bounded wait for the stop/termination that follows a step
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;

/// Bounded wait for the threads query issued by pause
pub const DEFAULT_THREAD_QUERY_TIMEOUT_MS: u64 = 2_000;

/// How long pause waits for the stopped event before reporting
pub const DEFAULT_PAUSE_CONFIRM_TIMEOUT_MS: u64 = 1_000;

/// How long start waits for the initial stop when stop-on-entry is requested
pub const DEFAULT_STOP_ON_ENTRY_TIMEOUT_MS: u64 = 3_000;

/// Bounded wait for the top-frame query that locates a stop
pub const DEFAULT_LOCATION_QUERY_TIMEOUT_MS: u64 = 2_000;

pub const DEFAULT_MAX_STACK_FRAMES: i64 = 50;

/// Program output lines kept per session
pub const DEFAULT_OUTPUT_BUFFER_LINES: usize = 500;

/// Capacity of per-session event channels
pub const DEFAULT_SESSION_EVENT_CAPACITY: usize = 256;

// ============================================================================
// Logging
// ============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_CONFIG_FILENAME: &str = "stepwise.toml";
