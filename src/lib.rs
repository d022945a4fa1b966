//! Origin-scoped RPC between a host context and the embedded contexts it
//! hosts.
//!
//! Two isolated execution contexts that can only exchange asynchronous,
//! origin-tagged messages call each other's operations as if they were
//! local async functions. The embedded side [`expose`]s a [`MethodTable`];
//! the host side [`connect`]s, performs a nonce handshake, and then issues
//! calls that are correlated with their responses by id, bounded by
//! timeouts, and cancelled on teardown.
//!
//! The platform's message primitive is abstracted as a [`Transport`]. An
//! in-process [`MemoryLink`] ships with the crate.
//!
//! # Logging
//!
//! With the `logging` feature, events are emitted through `tracing` under
//! the `frame_rpc` target. Without it only errors are printed to stderr.

// Import all sub modules once...
mod macros;

mod channel;
mod client;
mod domain;
mod protocol;
mod server;
mod transport;

mod config;
mod connection_builder;

mod correlation;
mod error;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{Connection, ConnectionState};
pub use server::{Exposure, MethodTable};

pub use channel::{ChannelAdapter, Listener, ListenerId};

pub use config::{ConnectConfig, ExposeConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT};
pub use connection_builder::ConnectionBuilder;

pub use correlation::{CorrelationId, Nonce};
pub use error::{Result, RpcError};

pub use protocol::{is_protocol_message, ProtocolMessage, MARKER, MARKER_FIELD};

pub use transport::{MemoryLink, MemoryTransport};

// --- public re-exports
pub use domain::{
    //
    Inbound,
    Origin,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    ANY_ORIGIN,
};

/// Connect to the embedded context behind `transport`.
///
/// See [`Connection::connect`].
pub async fn connect(transport: TransportPtr, config: ConnectConfig) -> Result<Connection> {
    // ---
    Connection::connect(transport, config).await
}

/// Expose `methods` to the parent context behind `transport`.
///
/// See [`Exposure::expose`].
pub async fn expose(
    transport: TransportPtr,
    methods: MethodTable,
    config: ExposeConfig,
) -> Result<Exposure> {
    // ---
    Exposure::expose(transport, methods, config).await
}
