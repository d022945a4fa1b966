// src/domain/transport.rs

//! Platform transport abstraction.
//!
//! A `Transport` is the host platform's cross-context message primitive as
//! seen from one side of a host/embedded pair: fire-and-forget sends tagged
//! with the origin the sender expects the receiver to have, inbound payloads
//! tagged with the sender's origin, and a one-shot "loaded" signal for the
//! remote context.
//!
//! Transports know nothing about the RPC protocol. Marker checks, origin
//! filtering, correlation and timeouts all live above this layer, in the
//! channel adapter and the two dispatchers.
//!
//! Concrete implementations live under `src/transport/`.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;

/// Shared base state for transport implementations.
///
/// Concrete transports embed this as a field named `base` so the default
/// `Transport` accessors can delegate to it.
///
/// ```ignore
/// struct WorkerTransport {
///     base: TransportBase,
///     // ... platform specific fields
/// }
///
/// impl Transport for WorkerTransport {
///     fn base(&self) -> &TransportBase { &self.base }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransportBase {
    /// Identifier used in log lines.
    pub transport_id: String,
    /// Origin of the context that owns this end of the link.
    pub local_origin: Arc<str>,
}

impl TransportBase {
    pub fn new(transport_id: impl Into<String>, local_origin: impl Into<Arc<str>>) -> Self {
        Self {
            transport_id: transport_id.into(),
            local_origin: local_origin.into(),
        }
    }
}

/// A payload delivered by the platform, before any filtering.
#[derive(Clone, Debug)]
pub struct Inbound {
    /// Raw message body. May be anything, including other libraries' traffic.
    pub payload: Value,
    /// Origin of the sending context, as reported by the platform.
    pub origin: Arc<str>,
}

/// Handle returned from a successful subscription.
///
/// Dropping the handle (closing the receiver) unsubscribes; the transport
/// prunes closed inboxes on its own.
pub struct SubscriptionHandle {
    // ---
    /// Every payload delivered to this side of the link, unfiltered.
    pub inbox: mpsc::Receiver<Inbound>,
}

/// Host platform message primitive for one side of a host/embedded link.
///
/// Implementations must ensure that:
/// - once `subscribe()` returns, payloads delivered afterwards reach the
///   returned inbox;
/// - `post()` never blocks on the remote side processing the payload;
/// - a `post()` whose `target_origin` is neither `"*"` nor the receiver's
///   actual origin is dropped by the platform, not delivered.
///
/// Ordering between one pair of contexts is preserved by typical platforms
/// but nothing above this layer relies on it.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Origin of the local context. Every payload this side posts is
    /// delivered tagged with it.
    fn local_origin(&self) -> &str {
        &self.base().local_origin
    }

    /// Whether the remote context can currently be addressed at all.
    ///
    /// A host checks this before connecting; an embedded frame that was
    /// removed from its parent is the typical `false` case.
    fn is_reachable(&self) -> bool {
        true
    }

    /// Resolve once the remote context has finished loading.
    ///
    /// One-shot: after the first resolution every later call returns
    /// immediately.
    async fn loaded(&self) -> Result<()>;

    /// Deliver `payload` to the remote context, tagged with the origin the
    /// receiver is expected to have (`"*"` for no restriction).
    async fn post(&self, payload: Value, target_origin: &str) -> Result<()>;

    /// Register a listener for payloads delivered to this side.
    async fn subscribe(&self) -> Result<SubscriptionHandle>;

    /// Drop every listener registered on this side.
    ///
    /// Shutdown hook for the context that owns this side. Connections and
    /// exposures never call it, since several of them may share one
    /// transport; each releases only its own subscription on destroy.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only bumps a reference count; connections and exposures keep
/// one each.
pub type TransportPtr = Arc<dyn Transport>;
