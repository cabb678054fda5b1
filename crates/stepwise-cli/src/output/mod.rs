//! Output formatting for CLI commands
//!
//! - Table format (default, human-readable)
//! - JSON format (for scripting)

mod format;
mod json;
mod table;

pub use format::{Formatter, OutputFormat};
