//! Caller engine.
//!
//! A [`Connection`] lives in the host context. It drives the handshake with
//! one embedded context and then turns method calls into `Request` messages,
//! matching each `Response` or `Error` to the waiting caller by call id.
//!
//! # Settlement
//!
//! Every call is recorded in a pending map keyed by its id. A call settles
//! exactly once, on whichever of these happens first:
//!
//! - a matching `Response` (the result)
//! - a matching `Error` ([`RpcError::Remote`])
//! - its timer firing ([`RpcError::CallTimeout`])
//! - [`Connection::destroy`] ([`RpcError::ConnectionDestroyed`])
//!
//! Removing the entry from the map decides the race. Whoever loses finds
//! nothing and does nothing, so a late response after a timeout is ignored.
//!
//! # Timers
//!
//! Each call's timer is its own task. Settling by any other route aborts
//! it, so no timer outlives its call.
mod pending;
mod remote_api;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::channel::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    ChannelAdapter,
    ConnectConfig,
    CorrelationId,
    ListenerId,
    Nonce,
    Origin,
    ProtocolMessage,
    Result,
    RpcError,
    TransportPtr,
};

use pending::{PendingCall, PendingCalls};

/// Lifecycle of a [`Connection`].
///
/// `Connecting` then `Established` then `Destroyed`, or `Connecting` then
/// `Failed`. A handle is only ever returned to the consumer once
/// established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Failed,
    Destroyed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Established => "established",
            ConnectionState::Failed => "failed",
            ConnectionState::Destroyed => "destroyed",
        };
        f.write_str(text)
    }
}

/// Established RPC connection to one embedded context.
///
/// Cheap to clone; all clones share the same pending map and channel.
/// Dropping the last clone tears the connection down like
/// [`destroy`](Self::destroy).
///
/// # Example
///
/// ```
/// use frame_rpc::{connect, expose, ConnectConfig, ExposeConfig, MemoryLink, MethodTable};
/// use std::convert::Infallible;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> frame_rpc::Result<()> {
/// let link = MemoryLink::new("https://parent.example.com", "https://widget.example.com");
///
/// let methods = MethodTable::new()
///     .method("add", |(a, b): (i64, i64)| async move { Ok::<_, Infallible>(a + b) });
/// let _exposure = expose(
///     link.embedded(),
///     methods,
///     ExposeConfig::new("https://parent.example.com"),
/// )
/// .await?;
/// link.mark_loaded();
///
/// let connection = connect(link.host(), ConnectConfig::new("https://widget.example.com")).await?;
/// let sum: i64 = connection.call("add", (2, 3)).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Shared {
    // ---
    state: ConnectionState,
    pending: PendingCalls,
    /// Fired by the first matching handshake response.
    handshake: Option<oneshot::Sender<()>>,
}

struct Inner {
    // ---
    adapter: ChannelAdapter,
    listener: ListenerId,
    nonce: Nonce,
    config: ConnectConfig,
    shared: Mutex<Shared>,
}

impl Connection {
    // ---

    /// Handshake with the embedded context behind `transport` and return an
    /// established connection.
    ///
    /// Waits for the context to load, sends one handshake request carrying
    /// a fresh nonce, and completes on the first response echoing it. The
    /// whole sequence is bounded by `config.handshake_timeout`.
    ///
    /// # Errors
    ///
    /// - `RpcError::Unreachable` if the target cannot be addressed at all
    /// - `RpcError::HandshakeTimeout` if no valid response arrived in time
    /// - the transport's error if subscribing, loading or sending fails
    ///
    /// On every error the channel adapter has already been torn down.
    pub async fn connect(transport: TransportPtr, config: ConnectConfig) -> Result<Self> {
        // ---
        if !transport.is_reachable() {
            return Err(RpcError::Unreachable);
        }

        let nonce = Nonce::generate();
        let adapter = ChannelAdapter::open(transport.clone(), config.target_origin.clone()).await?;
        let (handshake_tx, handshake_rx) = oneshot::channel();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            // ---
            let weak = weak.clone();

            let listener = adapter.subscribe(move |msg| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_message(msg);
                }
            });

            Inner {
                adapter,
                listener,
                nonce,
                config,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Connecting,
                    pending: PendingCalls::new(),
                    handshake: Some(handshake_tx),
                }),
            }
        });

        let limit = inner.config.handshake_timeout;
        let handshake = inner.handshake(&transport, handshake_rx);

        match tokio::time::timeout(limit, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log_warn!("handshake with {} failed: {err}", inner.adapter.origin());
                inner.fail();
                return Err(err);
            }
            Err(_) => {
                // A response accepted right at the deadline still counts.
                if inner.fail() {
                    log_warn!(
                        "handshake with {} timed out after {}ms",
                        inner.adapter.origin(),
                        limit.as_millis()
                    );
                    return Err(RpcError::HandshakeTimeout {
                        timeout_ms: limit.as_millis(),
                    });
                }
            }
        }

        log_info!(
            "{} connected to {}",
            transport.local_origin(),
            inner.adapter.origin()
        );

        Ok(Self { inner })
    }

    /// Call `method` with positional `args` and decode its result.
    ///
    /// `args` is serialized to JSON: a tuple or sequence is spread into the
    /// positional argument list, `()` means no arguments, and any other
    /// value is passed as the single argument.
    ///
    /// # Errors
    ///
    /// - `RpcError::Remote` with the callee's message text
    /// - `RpcError::CallTimeout` if nothing settled within the call timeout
    /// - `RpcError::ConnectionDestroyed` if the connection was or is
    ///   destroyed before settlement
    /// - `RpcError::Serialization` if `args` or the result do not convert
    pub async fn call<A, R>(&self, method: &str, args: A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        // ---
        self.call_with_timeout(method, args, self.inner.config.call_timeout)
            .await
    }

    /// Like [`call`](Self::call), with a timeout for this call only.
    pub async fn call_with_timeout<A, R>(&self, method: &str, args: A, timeout: Duration) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let args = encode_args(args)?;
        let result = self.inner.invoke(method, args, timeout).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Call `method` with an already encoded argument list and return the
    /// raw JSON result.
    pub async fn call_raw(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        self.inner
            .invoke(method, args, self.inner.config.call_timeout)
            .await
    }

    /// Reject every pending call with `RpcError::ConnectionDestroyed`,
    /// release the channel, and refuse further calls.
    ///
    /// Pending calls are settled before this returns. Safe to call more
    /// than once.
    pub fn destroy(&self) {
        // ---
        let drained = {
            let mut shared = lock_ignore_poison(&self.inner.shared);
            if shared.state == ConnectionState::Destroyed {
                return;
            }
            shared.state = ConnectionState::Destroyed;
            shared.handshake.take();
            shared.pending.drain()
        };

        log_debug!(
            "connection to {} destroyed, {} pending call(s) rejected",
            self.inner.adapter.origin(),
            drained.len()
        );

        for call in drained {
            call.settle(Err(RpcError::ConnectionDestroyed));
        }

        self.inner.release();
    }

    pub fn state(&self) -> ConnectionState {
        lock_ignore_poison(&self.inner.shared).state
    }

    /// Number of calls sent and not yet settled.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.shared).pending.len()
    }

    /// Origin of the embedded context this connection talks to.
    pub fn target_origin(&self) -> &Origin {
        self.inner.adapter.origin()
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("target_origin", self.target_origin())
            .field("state", &self.state())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

impl Inner {
    // ---

    async fn handshake(&self, transport: &TransportPtr, established: oneshot::Receiver<()>) -> Result<()> {
        // ---
        transport.loaded().await?;

        log_debug!("{} loaded, sending handshake", self.adapter.origin());

        self.adapter
            .send(&ProtocolMessage::handshake_request(self.nonce.clone()))
            .await?;

        established
            .await
            .map_err(|_| RpcError::ConnectionDestroyed)
    }

    /// Mark a connect attempt as failed and release the channel. Returns
    /// false, doing nothing, if the handshake completed after all.
    fn fail(&self) -> bool {
        // ---
        {
            let mut shared = lock_ignore_poison(&self.shared);
            if shared.state == ConnectionState::Established {
                return false;
            }
            shared.state = ConnectionState::Failed;
            shared.handshake.take();
        }

        self.release();
        true
    }

    fn release(&self) {
        self.adapter.unsubscribe(self.listener);
        self.adapter.destroy();
    }

    fn on_message(&self, msg: &ProtocolMessage) {
        // ---
        match msg {
            ProtocolMessage::HandshakeResponse { nonce } => self.on_handshake(nonce),
            ProtocolMessage::Response { id, result } => self.settle(id, Ok(result.clone())),
            ProtocolMessage::Error { id, error } => {
                self.settle(id, Err(RpcError::Remote(error.clone())))
            }
            // Requests and handshake requests belong to exposures.
            _ => {}
        }
    }

    fn on_handshake(&self, nonce: &Nonce) {
        // ---
        let mut shared = lock_ignore_poison(&self.shared);

        if shared.state != ConnectionState::Connecting {
            log_debug!("handshake response while {}, ignored", shared.state);
            return;
        }

        if *nonce != self.nonce {
            log_debug!("handshake response with foreign nonce, ignored");
            return;
        }

        shared.state = ConnectionState::Established;

        if let Some(tx) = shared.handshake.take() {
            let _ = tx.send(());
        }
    }

    fn settle(&self, id: &CorrelationId, outcome: Result<Value>) {
        // ---
        let call = lock_ignore_poison(&self.shared).pending.take(id);

        match call {
            Some(call) => call.settle(outcome),
            None => {
                log_debug!("no pending call {id}, reply ignored");
            }
        }
    }

    async fn invoke(self: &Arc<Self>, method: &str, args: Vec<Value>, timeout: Duration) -> Result<Value> {
        // ---
        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();

        {
            let mut shared = lock_ignore_poison(&self.shared);
            if shared.state != ConnectionState::Established {
                return Err(RpcError::ConnectionDestroyed);
            }

            let timer = self.spawn_timer(id.clone(), timeout);
            shared
                .pending
                .insert(id.clone(), PendingCall::new(method, tx, timer));
        }

        log_debug!("call {id}: {method}");

        let request = ProtocolMessage::request(id.clone(), method, args);

        if let Err(err) = self.adapter.send(&request).await {
            let withdrawn = lock_ignore_poison(&self.shared).pending.take(&id);
            if let Some(call) = withdrawn {
                call.withdraw();
                return Err(err);
            }
            // Already settled (destroyed meanwhile); report that outcome.
        }

        rx.await.unwrap_or(Err(RpcError::ConnectionDestroyed))
    }

    fn spawn_timer(self: &Arc<Self>, id: CorrelationId, timeout: Duration) -> AbortHandle {
        // ---
        let weak = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };

            let call = lock_ignore_poison(&inner.shared).pending.take(&id);
            if let Some(call) = call {
                log_debug!("call {id} timed out");
                call.expire(timeout);
            }
        });

        task.abort_handle()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        let drained = lock_ignore_poison(&self.shared).pending.drain();
        for call in drained {
            call.settle(Err(RpcError::ConnectionDestroyed));
        }
    }
}

/// Spread a serialized argument value into the positional list.
fn encode_args<A: Serialize>(args: A) -> Result<Vec<Value>> {
    // ---
    match serde_json::to_value(args)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        single => Ok(vec![single]),
    }
}
