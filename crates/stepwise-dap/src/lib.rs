//! Stepwise DAP - Debug Adapter Protocol plumbing
//!
//! Wire types, the request/response correlator ([`DapBroker`]), process and
//! TCP transports, per-backend protocol policies, the [`Proxy`] that owns one
//! running backend, and the adapter registry.
//!
//! # Architecture
//!
//! - `transport` opens a byte channel to a spawned backend
//! - `broker` frames messages and correlates responses by sequence number
//! - `policy` absorbs the protocol quirks of each backend
//! - `proxy` composes the three into one backend lifecycle
//! - `adapters` and `registry` decide which backend runs for a language

pub mod adapters;
pub mod broker;
pub mod constants;
pub mod error;
pub mod ext;
pub mod policy;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod transport;

pub use adapters::{
    AdapterCommand, AdapterCommandConfig, AdapterFactory, AdapterMetadata, EnvironmentReport,
};
pub use broker::{read_message, write_message, DapBroker, PendingResponse};
pub use error::{Error, Result};
pub use ext::DebugResult;
pub use policy::{
    AdapterSpecificState, BackendPolicy, ChildSessionStrategy, HandshakeOrder,
    ReverseRequestAction, SpawnPayload,
};
pub use protocol::*;
pub use proxy::{
    BreakpointBatchResult, HandshakeOutcome, HandshakePlan, Proxy, ProxyEvent, ProxyState,
};
pub use registry::{AdapterAvailability, AdapterRegistry, AdapterResolver, BuiltinResolver, Resolution};
pub use transport::{
    ProcessConnector, SpawnConfig, TransportChannel, TransportConnector, TransportKind,
};
