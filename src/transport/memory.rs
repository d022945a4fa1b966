//! In-memory transport implementation.
//!
//! A [`MemoryLink`] models one host context and one embedded context that
//! live in the same process, connected the way a browser connects a page to
//! an iframe it embeds. It is intended for tests, local execution, and as
//! the reference for platform semantics.
//!
//! ## Reference Semantics
//!
//! - A payload posted with a target origin other than `"*"` is delivered only
//!   if the receiving context actually has that origin; otherwise the
//!   platform drops it silently.
//! - Every delivered payload carries the sender context's origin.
//! - Once `subscribe()` returns, payloads delivered afterwards reach the
//!   returned inbox.
//! - The host end's `loaded()` resolves once [`MemoryLink::mark_loaded`] has
//!   been called; the embedded end treats its parent as always loaded.
//! - After [`MemoryLink::detach`] the embedded context is unreachable and
//!   posts in either direction fail.
//!
//! ## Non-Goals
//!
//! No serialization round trip, no cross-process delivery, no emulation of
//! platform-specific structured-clone rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch, RwLock};

use crate::{
    // ---
    log_debug,
    log_info,
    Inbound,
    Result,
    RpcError,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
    ANY_ORIGIN,
};

const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Host,
    Embedded,
}

impl End {
    fn opposite(self) -> Self {
        match self {
            End::Host => End::Embedded,
            End::Embedded => End::Host,
        }
    }
}

/// One context's listener list.
struct Side {
    origin: Arc<str>,
    subscribers: RwLock<Vec<mpsc::Sender<Inbound>>>,
}

impl Side {
    fn new(origin: Arc<str>) -> Self {
        Self {
            origin,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    async fn deliver(&self, _transport_id: &str, inbound: Inbound) {
        // ---
        let subs = self.subscribers.read().await;

        for sender in subs.iter() {
            // A closed channel is a dropped SubscriptionHandle; skip it.
            if let Err(_err) = sender.send(inbound.clone()).await {
                log_debug!("{_transport_id}: listener gone, payload skipped");
            }
        }
    }

    async fn live_subscribers(&self) -> usize {
        let subs = self.subscribers.read().await;
        subs.iter().filter(|tx| !tx.is_closed()).count()
    }
}

struct LinkState {
    host: Side,
    embedded: Side,
    loaded: watch::Sender<bool>,
    attached: AtomicBool,
}

impl LinkState {
    fn side(&self, end: End) -> &Side {
        match end {
            End::Host => &self.host,
            End::Embedded => &self.embedded,
        }
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// A host/embedded pair of in-process transports.
///
/// ```
/// # use frame_rpc::MemoryLink;
/// let link = MemoryLink::new("https://parent.example.com", "https://widget.example.com");
/// let host_side = link.host();         // handed to `connect`
/// let embedded_side = link.embedded(); // handed to `expose`
/// link.mark_loaded();
/// ```
pub struct MemoryLink {
    // ---
    state: Arc<LinkState>,
    host: Arc<MemoryTransport>,
    embedded: Arc<MemoryTransport>,
}

impl MemoryLink {
    /// Create a link between a host context at `host_origin` and an embedded
    /// context at `embedded_origin`. The embedded context starts out attached
    /// but not yet loaded.
    pub fn new(host_origin: impl Into<Arc<str>>, embedded_origin: impl Into<Arc<str>>) -> Self {
        // ---
        let host_origin = host_origin.into();
        let embedded_origin = embedded_origin.into();

        let (loaded, _) = watch::channel(false);

        let state = Arc::new(LinkState {
            host: Side::new(host_origin.clone()),
            embedded: Side::new(embedded_origin.clone()),
            loaded,
            attached: AtomicBool::new(true),
        });

        let host = Arc::new(MemoryTransport {
            base: TransportBase::new(format!("host@{host_origin}"), host_origin),
            end: End::Host,
            state: state.clone(),
        });

        let embedded = Arc::new(MemoryTransport {
            base: TransportBase::new(format!("embedded@{embedded_origin}"), embedded_origin),
            end: End::Embedded,
            state: state.clone(),
        });

        Self {
            state,
            host,
            embedded,
        }
    }

    /// The host context's view: addresses the embedded context.
    pub fn host(&self) -> TransportPtr {
        self.host.clone()
    }

    /// The embedded context's view: addresses its parent.
    pub fn embedded(&self) -> TransportPtr {
        self.embedded.clone()
    }

    /// Concrete host end, for [`MemoryTransport::inject`].
    pub fn host_end(&self) -> &Arc<MemoryTransport> {
        &self.host
    }

    /// Concrete embedded end, for [`MemoryTransport::inject`].
    pub fn embedded_end(&self) -> &Arc<MemoryTransport> {
        &self.embedded
    }

    /// Fire the embedded context's one-shot "loaded" signal.
    pub fn mark_loaded(&self) {
        self.state.loaded.send_replace(true);
    }

    /// Remove the embedded context; it becomes unreachable.
    pub fn detach(&self) {
        log_info!("{}: detached", self.embedded.transport_id());
        self.state.attached.store(false, Ordering::Release);
    }
}

/// One end of a [`MemoryLink`].
pub struct MemoryTransport {
    // ---
    base: TransportBase,
    end: End,
    state: Arc<LinkState>,
}

impl MemoryTransport {
    fn local(&self) -> &Side {
        self.state.side(self.end)
    }

    fn remote(&self) -> &Side {
        self.state.side(self.end.opposite())
    }

    /// Deliver `payload` to this end's listeners as if a context at `origin`
    /// had sent it. Lets tests put foreign or malformed traffic on the
    /// channel.
    pub async fn inject(&self, payload: Value, origin: &str) {
        // ---
        let inbound = Inbound {
            payload,
            origin: Arc::from(origin),
        };
        self.local().deliver(self.transport_id(), inbound).await;
    }

    /// Number of listeners on this end whose inbox is still open.
    pub async fn subscriber_count(&self) -> usize {
        self.local().live_subscribers().await
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    fn is_reachable(&self) -> bool {
        self.state.is_attached()
    }

    async fn loaded(&self) -> Result<()> {
        // ---
        if self.end == End::Embedded {
            return Ok(());
        }

        let mut rx = self.state.loaded.subscribe();
        rx.wait_for(|loaded| *loaded)
            .await
            .map_err(|_| RpcError::Transport("link dropped before load".into()))?;

        Ok(())
    }

    /// Deliver to the opposite end, honoring the target-origin tag.
    async fn post(&self, payload: Value, target_origin: &str) -> Result<()> {
        // ---
        if !self.state.is_attached() {
            return Err(RpcError::Transport(format!(
                "{}: remote context detached",
                self.transport_id()
            )));
        }

        let remote = self.remote();

        if target_origin != ANY_ORIGIN && *remote.origin != *target_origin {
            log_debug!(
                "{}: target origin {target_origin} does not match {}, dropped",
                self.transport_id(),
                remote.origin
            );
            return Ok(());
        }

        let inbound = Inbound {
            payload,
            origin: self.base.local_origin.clone(),
        };

        remote.deliver(self.transport_id(), inbound).await;
        Ok(())
    }

    async fn subscribe(&self) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{}: subscribe", self.transport_id());

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.local().subscribers.write().await;
        subs.retain(|tx| !tx.is_closed());
        subs.push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing transport...", self.transport_id());

        let mut subs = self.local().subscribers.write().await;
        subs.clear();
        Ok(())
    }
}
