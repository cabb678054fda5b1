//! Error types for Stepwise debug sessions

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Error Codes - Machine-readable codes for API consumers
// ============================================================================

/// Machine-readable error codes for API consumers.
///
/// Error code ranges:
/// - 1xxx: Session and usage errors
/// - 2xxx: Adapter and environment errors
/// - 3xxx: Execution state errors
/// - 4xxx: Backend debugger errors
/// - 9xxx: Generic errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
pub enum ErrorCode {
    // Session errors (1xxx)
    /// Session not found (1001)
    SessionNotFound = 1001,
    /// Session already terminated (1002)
    SessionTerminated = 1002,
    /// Session already started (1003)
    SessionAlreadyStarted = 1003,
    /// Invalid language tag (1004)
    InvalidLanguage = 1004,
    /// Invalid argument (1005)
    InvalidArgument = 1005,

    // Adapter / environment errors (2xxx)
    /// Backend toolchain missing or misconfigured (2001)
    EnvironmentInvalid = 2001,
    /// Debugger executable not found (2002)
    ExecutableNotFound = 2002,
    /// Debug target not found (2003)
    TargetNotFound = 2003,
    /// No adapter module for the language (2004)
    AdapterNotInstalled = 2004,
    /// Adapter module present but unusable (2005)
    AdapterMalformed = 2005,

    // Execution state errors (3xxx)
    /// Operation requires a paused session (3001)
    NotPaused = 3001,
    /// No live proxy for the session (3002)
    ProxyNotRunning = 3002,
    /// Bounded wait exceeded (3003)
    Timeout = 3003,

    // Backend errors (4xxx)
    /// Backend rejected a breakpoint condition (4001)
    ConditionSyntaxInvalid = 4001,
    /// Backend process or protocol failure (4002)
    DebuggerError = 4002,

    // Generic (9xxx)
    /// Internal error (9001)
    InternalError = 9001,
    /// I/O error (9002)
    IoError = 9002,
    /// Serialization error (9003)
    SerializationError = 9003,
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

// ============================================================================
// Error Categories
// ============================================================================

/// Error categorization for callers deciding how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The caller misused a session id; surfaced as `Err`, never as a payload
    Usage,
    /// Temporary failure, the operation may succeed later
    Retryable,
    /// Permanent failure for this input
    Terminal,
    /// Bug or unexpected host condition
    Internal,
}

impl ErrorCategory {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Usage => "usage",
            ErrorCategory::Retryable => "retryable",
            ErrorCategory::Terminal => "terminal",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Retryable)
    }
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the category of this error code
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::SessionNotFound | ErrorCode::SessionTerminated => ErrorCategory::Usage,

            ErrorCode::NotPaused | ErrorCode::Timeout | ErrorCode::ProxyNotRunning => {
                ErrorCategory::Retryable
            }

            ErrorCode::SessionAlreadyStarted
            | ErrorCode::InvalidLanguage
            | ErrorCode::InvalidArgument
            | ErrorCode::EnvironmentInvalid
            | ErrorCode::ExecutableNotFound
            | ErrorCode::TargetNotFound
            | ErrorCode::AdapterNotInstalled
            | ErrorCode::AdapterMalformed
            | ErrorCode::ConditionSyntaxInvalid
            | ErrorCode::DebuggerError => ErrorCategory::Terminal,

            ErrorCode::InternalError | ErrorCode::IoError | ErrorCode::SerializationError => {
                ErrorCategory::Internal
            }
        }
    }

    /// Get the error code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionTerminated => "SESSION_TERMINATED",
            ErrorCode::SessionAlreadyStarted => "SESSION_ALREADY_STARTED",
            ErrorCode::InvalidLanguage => "INVALID_LANGUAGE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::EnvironmentInvalid => "ENVIRONMENT_INVALID",
            ErrorCode::ExecutableNotFound => "EXECUTABLE_NOT_FOUND",
            ErrorCode::TargetNotFound => "TARGET_NOT_FOUND",
            ErrorCode::AdapterNotInstalled => "ADAPTER_NOT_INSTALLED",
            ErrorCode::AdapterMalformed => "ADAPTER_MALFORMED",
            ErrorCode::NotPaused => "NOT_PAUSED",
            ErrorCode::ProxyNotRunning => "PROXY_NOT_RUNNING",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConditionSyntaxInvalid => "CONDITION_SYNTAX_INVALID",
            ErrorCode::DebuggerError => "DEBUGGER_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} is terminated")]
    SessionTerminated(String),

    #[error("Session {0} has already been started")]
    SessionAlreadyStarted(String),

    #[error("{0}")]
    InvalidLanguage(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Adapter / environment errors
    #[error("Debugger environment is invalid: {0}")]
    EnvironmentInvalid(String),

    #[error("Debugger executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Debug target not found: {0}")]
    TargetNotFound(String),

    #[error("No debug adapter installed for '{language}'. {guidance}")]
    AdapterNotInstalled { language: String, guidance: String },

    #[error("Debug adapter for '{language}' is malformed: {reason}")]
    AdapterMalformed { language: String, reason: String },

    // Execution state errors
    #[error("Session {0} is not paused")]
    NotPaused(String),

    #[error("Debugger proxy is not running: {0}")]
    ProxyNotRunning(String),

    /// A bounded wait expired. The request that started the wait is not retracted.
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    // Backend errors
    #[error("Breakpoint condition rejected: {0}")]
    ConditionSyntaxInvalid(String),

    #[error("Debugger error: {0}")]
    DebuggerError(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Get the machine-readable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Error::SessionTerminated(_) => ErrorCode::SessionTerminated,
            Error::SessionAlreadyStarted(_) => ErrorCode::SessionAlreadyStarted,
            Error::InvalidLanguage(_) => ErrorCode::InvalidLanguage,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::EnvironmentInvalid(_) => ErrorCode::EnvironmentInvalid,
            Error::ExecutableNotFound(_) => ErrorCode::ExecutableNotFound,
            Error::TargetNotFound(_) => ErrorCode::TargetNotFound,
            Error::AdapterNotInstalled { .. } => ErrorCode::AdapterNotInstalled,
            Error::AdapterMalformed { .. } => ErrorCode::AdapterMalformed,
            Error::NotPaused(_) => ErrorCode::NotPaused,
            Error::ProxyNotRunning(_) => ErrorCode::ProxyNotRunning,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::ConditionSyntaxInvalid(_) => ErrorCode::ConditionSyntaxInvalid,
            Error::DebuggerError(_) => ErrorCode::DebuggerError,
            Error::Internal(_) => ErrorCode::InternalError,
            Error::Io(_) => ErrorCode::IoError,
            Error::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// True for errors that describe misuse of a session id rather than an
    /// operation outcome. Only these cross the manager boundary as `Err`.
    pub fn is_usage_error(&self) -> bool {
        self.category() == ErrorCategory::Usage
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<crate::ParseLanguageError> for Error {
    fn from(err: crate::ParseLanguageError) -> Self {
        Error::InvalidLanguage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_are_only_session_identity_errors() {
        assert!(Error::SessionNotFound("s".into()).is_usage_error());
        assert!(Error::SessionTerminated("s".into()).is_usage_error());
        assert!(!Error::NotPaused("s".into()).is_usage_error());
        assert!(!Error::timeout("step", 5000).is_usage_error());
        assert!(!Error::DebuggerError("boom".into()).is_usage_error());
    }

    #[test]
    fn test_error_code_serializes_as_number() {
        let json = serde_json::to_string(&ErrorCode::NotPaused).unwrap();
        assert_eq!(json, "3001");
        assert_eq!(ErrorCode::ConditionSyntaxInvalid.name(), "CONDITION_SYNTAX_INVALID");
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = Error::timeout("stepOver", 5000);
        assert_eq!(err.to_string(), "Timed out after 5000ms waiting for stepOver");
        assert!(err.category().is_retryable());
    }
}
