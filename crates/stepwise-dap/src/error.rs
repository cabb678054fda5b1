//! Error types for DAP operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// DAP protocol violations: bad framing, unexpected message shapes,
    /// invalid proxy state transitions
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON parsing and deserialization failures
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Process I/O, socket and channel failures
    #[error("Adapter communication error: {0}")]
    Communication(String),

    /// The transport is closed or was never opened
    #[error("Adapter is not running: {0}")]
    NotRunning(String),

    /// Handshake failures
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// The backend answered a request with `success: false`
    #[error("'{command}' request failed: {message}")]
    RequestFailed { command: String, message: String },

    /// Request timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("No debug adapter installed for '{language}'. {guidance}")]
    AdapterNotInstalled { language: String, guidance: String },

    #[error("Debug adapter for '{language}' is malformed: {reason}")]
    AdapterMalformed { language: String, reason: String },

    /// The backend policy does not allow child sessions
    #[error("{0} does not support child debug sessions")]
    ChildSessionsUnsupported(String),

    /// Launch configuration could not be built
    #[error("Invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),
}

impl Error {
    pub(crate) fn request_failed(command: &str, message: Option<String>) -> Self {
        Error::RequestFailed {
            command: command.to_string(),
            message: message.unwrap_or_else(|| "no message from debugger".to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidMessage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Communication(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Protocol(format!("Invalid UTF-8: {}", err))
    }
}

impl From<Error> for stepwise_core::Error {
    fn from(err: Error) -> Self {
        use stepwise_core::Error as CoreError;
        match err {
            Error::NotRunning(msg) => CoreError::ProxyNotRunning(msg),
            Error::Timeout(ms) => CoreError::timeout("debugger response", ms),
            Error::ExecutableNotFound(msg) => CoreError::ExecutableNotFound(msg),
            Error::AdapterNotInstalled { language, guidance } => {
                CoreError::AdapterNotInstalled { language, guidance }
            }
            Error::AdapterMalformed { language, reason } => {
                CoreError::AdapterMalformed { language, reason }
            }
            Error::InvalidLaunchConfig(msg) => CoreError::InvalidArgument(msg),
            other => CoreError::DebuggerError(other.to_string()),
        }
    }
}
