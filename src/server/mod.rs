//! Callee dispatcher.
//!
//! An [`Exposure`] lives in the embedded context. It answers handshakes and
//! runs the operations of its [`MethodTable`] for inbound requests, sending
//! back exactly one response or error per request.
//!
//! # Execution
//!
//! Each request runs in its own spawned task, so a slow operation never
//! holds up the channel. Failures of any kind (unknown name, non-callable
//! entry, undecodable arguments, an `Err` from the operation, a panic) are
//! converted into protocol error messages; nothing escapes the dispatcher.
mod handler;

pub use handler::MethodTable;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    ChannelAdapter,
    CorrelationId,
    ExposeConfig,
    ListenerId,
    Origin,
    ProtocolMessage,
    Result,
    TransportPtr,
};

use handler::{HandlerFn, Outcome};

/// Running exposure of a method table to one parent context.
///
/// States: active, then destroyed (terminal). Cheap to clone; all clones
/// share the same dispatcher.
#[derive(Clone)]
pub struct Exposure {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    adapter: ChannelAdapter,
    listener: ListenerId,
    methods: MethodTable,
    active: AtomicBool,
}

impl Exposure {
    // ---

    /// Start answering handshakes and requests arriving on `transport` from
    /// `config.allowed_origin`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the platform subscription fails.
    pub async fn expose(
        transport: TransportPtr,
        methods: MethodTable,
        config: ExposeConfig,
    ) -> Result<Self> {
        // ---
        let adapter = ChannelAdapter::open(transport, config.allowed_origin).await?;

        log_info!(
            "exposing {} operation(s) to {}",
            methods.len(),
            adapter.origin()
        );

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
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
                methods,
                active: AtomicBool::new(true),
            }
        });

        Ok(Self { inner })
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Origin this exposure accepts traffic from.
    pub fn allowed_origin(&self) -> &Origin {
        self.inner.adapter.origin()
    }

    pub fn methods(&self) -> &MethodTable {
        &self.inner.methods
    }

    /// Stop listening and tear down the channel adapter.
    ///
    /// Requests arriving afterwards are ignored, not answered. Replies of
    /// operations still running at this point are discarded.
    pub fn destroy(&self) {
        // ---
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }

        log_debug!("exposure to {} destroyed", self.inner.adapter.origin());

        self.inner.adapter.unsubscribe(self.inner.listener);
        self.inner.adapter.destroy();
    }
}

impl Inner {
    // ---

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn on_message(self: Arc<Self>, msg: &ProtocolMessage) {
        // ---
        if !self.is_active() {
            return;
        }

        match msg {
            ProtocolMessage::HandshakeRequest { nonce } => {
                // Echoed verbatim; judging the nonce is the caller's job.
                let reply = ProtocolMessage::handshake_response(nonce.clone());
                tokio::spawn(async move { self.reply(reply).await });
            }
            ProtocolMessage::Request { id, method, args } => {
                let (id, method, args) = (id.clone(), method.clone(), args.clone());
                tokio::spawn(async move { self.dispatch(id, method, args).await });
            }
            // Responses and handshake responses belong to callers.
            _ => {}
        }
    }

    async fn dispatch(&self, id: CorrelationId, method: String, args: Vec<Value>) {
        // ---
        log_debug!("request {id}: {method}");

        let outcome = match self.methods.resolve(&method) {
            Ok(handler) => invoke(handler, method, args).await,
            Err(text) => Err(text),
        };

        let reply = match outcome {
            Ok(result) => ProtocolMessage::response(id, result),
            Err(text) => ProtocolMessage::error(id, text),
        };

        self.reply(reply).await;
    }

    async fn reply(&self, reply: ProtocolMessage) {
        // ---
        if !self.is_active() {
            log_debug!("exposure destroyed, {} discarded", reply.kind());
            return;
        }

        if let Err(_err) = self.adapter.send(&reply).await {
            log_warn!("failed to send {}: {_err}", reply.kind());
        }
    }
}

/// Run one operation in its own task so that a panic is contained and
/// reported as an error message.
async fn invoke(handler: Arc<dyn HandlerFn>, method: String, args: Vec<Value>) -> Outcome {
    // ---
    let name = method.clone();
    let task = tokio::spawn(async move { handler.call(&name, args).await });

    match task.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            let text = panic_message(err.into_panic());
            log_error!("operation \"{method}\" panicked: {text}");
            Err(text)
        }
        Err(_) => Err("operation was cancelled".to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    // ---
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "operation panicked".to_string()
    }
}
