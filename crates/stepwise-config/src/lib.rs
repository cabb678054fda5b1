//! Stepwise configuration
//!
//! `stepwise.toml` sections, their defaults, the loader and port helpers.
//!
//! ```toml
//! [adapter]
//! request_timeout_ms = 30000
//! shutdown_timeout_ms = 3000
//!
//! [session]
//! step_timeout_ms = 5000
//!
//! [logging]
//! level = "info"
//! ```

pub mod adapter;
pub mod constants;
pub mod loader;
pub mod paths;
pub mod ports;
pub mod session;
pub mod types;

pub use adapter::{AdapterConnectionConfig, BackoffConfig};
pub use constants::*;
pub use loader::{
    load_config, load_config_from_str, load_config_or_default, to_toml_string, validate_config,
    ConfigError,
};
pub use ports::{ephemeral_port, find_available_port, is_port_available};
pub use session::SessionConfig;
pub use types::{Config, LoggingConfig};
