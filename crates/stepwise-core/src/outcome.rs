//! Structured operation results returned across the session manager boundary

use crate::{Error, ErrorCode, ExecutionState, SourceLocation};
use serde::Serialize;

/// Success flag plus either a payload or a human-readable error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl<T> OpResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_code: Some(error.code()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OpResult<U> {
        OpResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_code: self.error_code,
        }
    }
}

impl<T> From<std::result::Result<T, Error>> for OpResult<T> {
    fn from(result: std::result::Result<T, Error>) -> Self {
        match result {
            Ok(data) => OpResult::ok(data),
            Err(e) => OpResult::failure(&e),
        }
    }
}

/// Outcome of start_debugging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StartOutcome {
    Started {
        state: ExecutionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<SourceLocation>,
    },
    #[serde(rename_all = "camelCase")]
    DryRun {
        command_line: String,
        transport: String,
    },
}

/// Outcome of step, continue and pause
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub state: ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExecutionOutcome {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            location: None,
            reason: None,
        }
    }

    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome of close_session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    /// False when the session was already gone
    pub closed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload_carries_message_and_code() {
        let result: OpResult<u32> = OpResult::failure(&Error::NotPaused("abc".into()));
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("Session abc is not paused"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errorCode"], 3001);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_start_outcome_is_tagged() {
        let outcome = StartOutcome::DryRun {
            command_line: "python -m debugpy.adapter".into(),
            transport: "stdio".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "dryRun");
        assert_eq!(json["commandLine"], "python -m debugpy.adapter");
    }
}
