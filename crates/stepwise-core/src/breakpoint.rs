//! Breakpoint entity

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Breakpoint identifier, unique within its session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(pub String);

impl BreakpointId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Backend confirmed placement
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_error: Option<String>,
    /// Backend explanation when not verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    order: u64,
}

impl Breakpoint {
    pub(crate) fn new(file: impl Into<String>, line: u32, condition: Option<String>, order: u64) -> Self {
        Self {
            id: BreakpointId::generate(),
            file: file.into(),
            line,
            condition: condition.filter(|c| !c.trim().is_empty()),
            verified: false,
            condition_verified: None,
            condition_error: None,
            message: None,
            order,
        }
    }

    /// Creation order within the session
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Apply one entry of a setBreakpoints response.
    ///
    /// Condition fields are only touched for conditional breakpoints and only
    /// when the backend attached a message to the entry.
    pub fn apply_backend_result(&mut self, verified: bool, message: Option<String>) {
        self.verified = verified;
        if self.has_condition() && message.is_some() {
            self.condition_verified = Some(verified);
            self.condition_error = if verified { None } else { message.clone() };
        }
        self.message = message;
    }

    /// Reset to the unverified state a queued breakpoint has.
    pub fn mark_unverified(&mut self) {
        self.verified = false;
        self.condition_verified = None;
        self.condition_error = None;
        self.message = None;
    }
}
