//! Stepwise Core - domain types for debug sessions
//!
//! Sessions, breakpoints, inspection records and the error taxonomy shared by
//! every other crate. No I/O and no async.

pub mod breakpoint;
pub mod error;
pub mod inspect;
pub mod language;
pub mod launch;
pub mod outcome;
pub mod session;

pub use breakpoint::{Breakpoint, BreakpointId};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use inspect::{
    EvaluationResult, LocalVariables, OutputLine, Scope, SourceContext, SourceLine, StackFrame,
    Variable,
};
pub use language::{DebugLanguage, ParseLanguageError};
pub use launch::{LaunchConfig, LaunchOptions};
pub use outcome::{CloseOutcome, ExecutionOutcome, OpResult, StartOutcome};
pub use session::{
    DebugSession, ExecutionState, SessionId, SessionLifecycle, SessionSummary, SourceLocation,
};
