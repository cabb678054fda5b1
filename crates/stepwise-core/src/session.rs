//! Debug session entity and its state machine

use crate::{Breakpoint, BreakpointId, DebugLanguage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in default session names and logs
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Coarse lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionLifecycle {
    Created,
    Active,
    Terminated,
}

/// Execution state of the debuggee while the session is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Initializing,
    Running,
    Paused,
    Terminated,
    Error,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Initializing => "initializing",
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Terminated => "terminated",
            ExecutionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A file/line pair in the debuggee's source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One debugging conversation with one backend.
///
/// `execution_state` is `Some` exactly while `lifecycle` is `Active`; the
/// mutators below are the only way to move between states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugSession {
    pub id: SessionId,
    pub language: DebugLanguage,
    pub name: String,
    lifecycle: SessionLifecycle,
    execution_state: Option<ExecutionState>,
    pub current_location: Option<SourceLocation>,
    pub executable_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub breakpoints: HashMap<BreakpointId, Breakpoint>,
    #[serde(skip)]
    next_breakpoint_order: u64,
}

impl DebugSession {
    pub fn new(language: DebugLanguage, name: Option<String>, executable_path: Option<PathBuf>) -> Self {
        let id = SessionId::generate();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}-session-{}", language.as_str(), id.short()));
        let now = Utc::now();
        Self {
            id,
            language,
            name,
            lifecycle: SessionLifecycle::Created,
            execution_state: None,
            current_location: None,
            executable_path,
            created_at: now,
            updated_at: now,
            breakpoints: HashMap::new(),
            next_breakpoint_order: 0,
        }
    }

    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle
    }

    pub fn execution_state(&self) -> Option<ExecutionState> {
        self.execution_state
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == SessionLifecycle::Active
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle == SessionLifecycle::Terminated
    }

    pub fn is_paused(&self) -> bool {
        self.execution_state == Some(ExecutionState::Paused)
    }

    /// Created -> Active with execution Initializing. Returns false if the
    /// session was not in Created.
    pub fn activate(&mut self) -> bool {
        if self.lifecycle != SessionLifecycle::Created {
            return false;
        }
        self.lifecycle = SessionLifecycle::Active;
        self.execution_state = Some(ExecutionState::Initializing);
        self.touch();
        true
    }

    /// Update the execution state. Ignored unless the session is Active.
    pub fn set_execution_state(&mut self, state: ExecutionState) -> bool {
        if self.lifecycle != SessionLifecycle::Active {
            return false;
        }
        self.execution_state = Some(state);
        if state != ExecutionState::Paused {
            self.current_location = None;
        }
        self.touch();
        true
    }

    /// Record a stop: Paused plus the location if known.
    pub fn mark_paused(&mut self, location: Option<SourceLocation>) -> bool {
        if !self.set_execution_state(ExecutionState::Paused) {
            return false;
        }
        self.current_location = location;
        true
    }

    /// Move to Terminated. Idempotent.
    pub fn terminate(&mut self) {
        if self.lifecycle == SessionLifecycle::Terminated {
            return;
        }
        self.lifecycle = SessionLifecycle::Terminated;
        self.execution_state = None;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Create and store a breakpoint, unverified.
    pub fn add_breakpoint(&mut self, file: impl Into<String>, line: u32, condition: Option<String>) -> Breakpoint {
        let order = self.next_breakpoint_order;
        self.next_breakpoint_order += 1;
        let bp = Breakpoint::new(file, line, condition, order);
        self.breakpoints.insert(bp.id.clone(), bp.clone());
        self.touch();
        bp
    }

    pub fn remove_breakpoint(&mut self, id: &BreakpointId) -> Option<Breakpoint> {
        let removed = self.breakpoints.remove(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Breakpoints for one file in the order they are sent to the backend.
    pub fn breakpoints_for_file(&self, file: &str) -> Vec<Breakpoint> {
        let mut list: Vec<Breakpoint> = self
            .breakpoints
            .values()
            .filter(|bp| bp.file == file)
            .cloned()
            .collect();
        list.sort_by_key(|bp| (bp.line, bp.order()));
        list
    }

    /// Distinct files that have breakpoints, sorted.
    pub fn breakpoint_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.breakpoints.values().map(|bp| bp.file.clone()).collect();
        files.sort();
        files.dedup();
        files
    }

    /// All breakpoints sorted by file, line, then creation order
    pub fn sorted_breakpoints(&self) -> Vec<Breakpoint> {
        let mut list: Vec<Breakpoint> = self.breakpoints.values().cloned().collect();
        list.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.line.cmp(&b.line))
                .then(a.order().cmp(&b.order()))
        });
        list
    }
}

/// Compact view of a session for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub language: DebugLanguage,
    pub lifecycle: SessionLifecycle,
    pub execution_state: Option<ExecutionState>,
    pub current_location: Option<SourceLocation>,
    pub breakpoint_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&DebugSession> for SessionSummary {
    fn from(session: &DebugSession) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            language: session.language,
            lifecycle: session.lifecycle,
            execution_state: session.execution_state,
            current_location: session.current_location.clone(),
            breakpoint_count: session.breakpoints.len(),
            created_at: session.created_at,
        }
    }
}
