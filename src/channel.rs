//! Channel adapter.
//!
//! The single choke point between the RPC layer and a platform
//! [`Transport`](crate::Transport). Outbound messages are encoded and tagged
//! with the configured counterparty origin. Inbound payloads go through two
//! mandatory filters, in this order:
//!
//! 1. origin: the sender's origin must match the configured one (or the
//!    adapter was opened with `"*"`);
//! 2. shape: the payload must carry the protocol marker and decode as a
//!    [`ProtocolMessage`].
//!
//! Survivors are multicast to every registered listener. Anything filtered
//! out is dropped silently; filtering is not validation reporting.
//!
//! # Receive loop
//!
//! Opening an adapter subscribes to the transport and spawns a receive task
//! that holds only a weak reference back to the adapter. The task ends when
//! the adapter is destroyed or dropped, which releases the platform
//! subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_warn,
    Inbound,
    Origin,
    ProtocolMessage,
    Result,
    RpcError,
    TransportPtr,
};

/// Acquire a mutex guard, ignoring poisoning.
///
/// Listener callbacks run outside the lock, so a poisoned guard can only
/// mean a panic inside the adapter's own bookkeeping; the listener list is
/// still usable.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Callback invoked for every message that passes both filters.
pub type Listener = Arc<dyn Fn(&ProtocolMessage) + Send + Sync>;

/// Registration token returned by [`ChannelAdapter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    origin: Origin,
    listeners: Mutex<Listeners>,
    destroyed: AtomicBool,
    rx_task: Mutex<Option<JoinHandle<()>>>,
}

/// Origin- and shape-filtering wrapper around one platform transport.
///
/// Owned by exactly one connection or exposure and destroyed with it.
pub struct ChannelAdapter {
    inner: Arc<Inner>,
}

impl ChannelAdapter {
    // ---

    /// Subscribe to `transport` and start filtering its inbound traffic.
    ///
    /// `origin` is both the accepted sender origin and the target origin
    /// stamped on every send. Passing [`Origin::Any`] disables origin
    /// isolation and is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the platform subscription fails.
    pub async fn open(transport: TransportPtr, origin: Origin) -> Result<Self> {
        // ---
        if origin.is_any() {
            log_warn!(
                "{}: channel opened with wildcard origin; any context may talk to it",
                transport.transport_id()
            );
        }

        let mut handle = transport.subscribe().await?;

        let inner = Arc::new(Inner {
            transport,
            origin,
            listeners: Mutex::new(Listeners::default()),
            destroyed: AtomicBool::new(false),
            rx_task: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let _transport_id = inner.transport.transport_id().to_string();

        let rx_task = tokio::spawn(async move {
            // ---
            while let Some(inbound) = handle.inbox.recv().await {
                match weak.upgrade() {
                    Some(inner) => inner.dispatch(inbound),
                    None => break,
                }
            }

            log_debug!("{_transport_id}: channel receive loop stopped");
        });

        *lock_ignore_poison(&inner.rx_task) = Some(rx_task);

        Ok(Self { inner })
    }

    /// Origin this adapter filters on and sends to.
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Encode `message` and hand it to the platform, tagged with the
    /// configured origin.
    ///
    /// # Errors
    ///
    /// - `RpcError::Closed` once the adapter has been destroyed
    /// - `RpcError::Serialization` if the message cannot be encoded
    /// - the transport's error if the platform rejects the delivery
    pub async fn send(&self, message: &ProtocolMessage) -> Result<()> {
        // ---
        if self.is_destroyed() {
            return Err(RpcError::Closed);
        }

        let payload = message.encode()?;

        self.inner
            .transport
            .post(payload, self.inner.origin.as_str())
            .await
    }

    /// Register a listener. Every listener sees every qualifying message.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ProtocolMessage) + Send + Sync + 'static,
    {
        // ---
        let mut listeners = lock_ignore_poison(&self.inner.listeners);

        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        // ---
        let mut listeners = lock_ignore_poison(&self.inner.listeners);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    /// Stop the receive loop, releasing the platform subscription, and drop
    /// every listener. Sends fail with `RpcError::Closed` afterwards.
    pub fn destroy(&self) {
        // ---
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        log_debug!("{}: channel destroyed", self.inner.transport.transport_id());

        lock_ignore_poison(&self.inner.listeners).entries.clear();
        self.inner.stop_rx_task();
    }
}

impl Inner {
    // ---

    fn dispatch(&self, inbound: Inbound) {
        // ---
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        if !self.origin.matches(&inbound.origin) {
            log_debug!(
                "{}: dropped message from unexpected origin {}",
                self.transport.transport_id(),
                inbound.origin
            );
            return;
        }

        let Some(message) = ProtocolMessage::decode(&inbound.payload) else {
            log_debug!(
                "{}: dropped non-protocol message from {}",
                self.transport.transport_id(),
                inbound.origin
            );
            return;
        };

        // Snapshot so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<Listener> = lock_ignore_poison(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(&message);
        }
    }

    fn stop_rx_task(&self) {
        if let Some(task) = lock_ignore_poison(&self.rx_task).take() {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_rx_task();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{MemoryLink, Nonce};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration};

    const PARENT: &str = "https://parent.example.com";
    const CHILD: &str = "https://child.example.com";

    fn counting(adapter: &ChannelAdapter) -> Arc<AtomicUsize> {
        // ---
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        adapter.subscribe(move |_msg| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn handshake() -> serde_json::Value {
        ProtocolMessage::handshake_request(Nonce::from("n-1"))
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_filters_origin_then_shape() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let adapter = ChannelAdapter::open(link.embedded(), Origin::from(PARENT))
            .await
            .unwrap();
        let count = counting(&adapter);

        let end = link.embedded_end();
        end.inject(handshake(), "https://evil.example.com").await;
        end.inject(json!({ "type": "request" }), PARENT).await;
        end.inject(json!("unrelated traffic"), PARENT).await;
        end.inject(handshake(), PARENT).await;

        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wildcard_accepts_any_origin() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let adapter = ChannelAdapter::open(link.embedded(), Origin::Any)
            .await
            .unwrap();
        let count = counting(&adapter);

        link.embedded_end()
            .inject(handshake(), "https://anyone.example.com")
            .await;
        link.embedded_end().inject(handshake(), PARENT).await;

        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_multicast_to_every_listener() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let adapter = ChannelAdapter::open(link.embedded(), Origin::from(PARENT))
            .await
            .unwrap();
        let first = counting(&adapter);
        let second = counting(&adapter);

        link.embedded_end().inject(handshake(), PARENT).await;

        sleep(Duration::from_millis(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let adapter = ChannelAdapter::open(link.embedded(), Origin::from(PARENT))
            .await
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let id = adapter.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(adapter.unsubscribe(id));
        assert!(!adapter.unsubscribe(id));

        link.embedded_end().inject(handshake(), PARENT).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_tags_target_origin() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let mut inbox = link.embedded().subscribe().await.unwrap().inbox;

        let pinned = ChannelAdapter::open(link.host(), Origin::from(CHILD))
            .await
            .unwrap();
        let wrong = ChannelAdapter::open(link.host(), Origin::from("https://other.example.com"))
            .await
            .unwrap();

        let msg = ProtocolMessage::handshake_request(Nonce::from("n-2"));
        wrong.send(&msg).await.unwrap();
        pinned.send(&msg).await.unwrap();

        let got = inbox.recv().await.unwrap();
        assert_eq!(ProtocolMessage::decode(&got.payload), Some(msg));
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_destroy_releases_subscription() {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);
        let adapter = ChannelAdapter::open(link.embedded(), Origin::from(PARENT))
            .await
            .unwrap();
        let count = counting(&adapter);
        assert_eq!(link.embedded_end().subscriber_count().await, 1);

        adapter.destroy();
        assert!(adapter.is_destroyed());

        sleep(Duration::from_millis(20)).await;
        assert_eq!(link.embedded_end().subscriber_count().await, 0);

        link.embedded_end().inject(handshake(), PARENT).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let msg = ProtocolMessage::handshake_response(Nonce::from("n-3"));
        assert!(matches!(adapter.send(&msg).await, Err(RpcError::Closed)));
    }
}
