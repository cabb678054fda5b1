//! Stepwise Session - the session manager
//!
//! Owns the table of debug sessions and exposes the upstream operation set:
//! create, breakpoints, start, stepping, inspection and close. Each Active
//! session owns one [`stepwise_dap::Proxy`]; backend events are applied to
//! session state by a per-session pump and republished as [`SessionEvent`]s.
//!
//! Every operation returns `Result<OpResult<T>>`. The outer `Err` is reserved
//! for usage errors (unknown or terminated session); anything else is a
//! failure payload.

mod breakpoints;
mod events;
mod execution;
mod inspect;
mod managed;
mod manager;
mod start;

pub use events::SessionEvent;
pub use manager::SessionManager;
pub use start::StartRequest;
