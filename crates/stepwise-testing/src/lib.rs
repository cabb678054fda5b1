//! Test utilities for Stepwise
//!
//! - [`FakeBackend`] - scripted DAP server over in-memory pipes; records
//!   every request it receives
//! - [`InMemoryConnector`] - a `TransportConnector` that hands out
//!   connections to a [`FakeBackend`] instead of spawning a process
//! - [`MockAdapterFactory`] / [`MockPolicy`] - adapter for the `mock`
//!   language
//! - [`proptest_config`] - shared property test settings
//!
//! # Usage
//!
//! ```no_run
//! use stepwise_testing::{FakeBackend, InMemoryConnector, Rule};
//! use stepwise_dap::constants::requests;
//!
//! let backend = FakeBackend::new();
//! backend.on(requests::NEXT, Rule::success());
//! let connector = InMemoryConnector::new(backend.clone());
//! ```

mod connector;
mod fake_backend;
mod mocks;
pub mod proptest_config;

pub use connector::InMemoryConnector;
pub use fake_backend::{FakeBackend, Reply, Rule, DEFAULT_SOURCE_LINE, DEFAULT_SOURCE_PATH};
pub use mocks::{MockAdapterFactory, MockPolicy};
