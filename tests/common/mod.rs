// tests/common/mod.rs
#![allow(dead_code)]

use std::convert::Infallible;
use std::time::Duration;

use tokio::sync::mpsc;

use frame_rpc::{
    // ---
    ChannelAdapter,
    MemoryLink,
    MethodTable,
    Nonce,
    Origin,
    ProtocolMessage,
};

pub const PARENT: &str = "https://parent.example.com";
pub const CHILD: &str = "https://child.example.com";
pub const EVIL: &str = "https://evil.example.com";

/// The operations used by most end-to-end tests.
pub fn demo_methods() -> MethodTable {
    // ---
    MethodTable::new()
        .method("add", |(a, b): (i64, i64)| async move {
            Ok::<_, Infallible>(a + b)
        })
        .method("greet", |(name,): (String,)| async move {
            Ok::<_, Infallible>(format!("Hello, {name}!"))
        })
        .method("fail", |()| async move {
            Err::<(), _>("boom".to_string())
        })
        .method("explode", |()| async move {
            if true {
                panic!("kaboom");
            }
            Ok::<_, Infallible>(())
        })
        .property("version", "1.2.0")
}

/// Hand-driven stand-in for an embedded context: records every protocol
/// message the host sends and replies only when told to.
pub struct FakeCallee {
    // ---
    adapter: ChannelAdapter,
    inbox: mpsc::UnboundedReceiver<ProtocolMessage>,
}

impl FakeCallee {
    // ---
    pub async fn open(link: &MemoryLink, allowed: &str) -> Self {
        // ---
        let adapter = ChannelAdapter::open(link.embedded(), Origin::from(allowed))
            .await
            .expect("fake callee failed to open");

        let (tx, inbox) = mpsc::unbounded_channel();
        adapter.subscribe(move |msg| {
            let _ = tx.send(msg.clone());
        });

        Self { adapter, inbox }
    }

    pub async fn next(&mut self) -> ProtocolMessage {
        // ---
        tokio::time::timeout(Duration::from_secs(1), self.inbox.recv())
            .await
            .expect("fake callee saw nothing")
            .expect("fake callee inbox closed")
    }

    pub fn try_next(&mut self) -> Option<ProtocolMessage> {
        self.inbox.try_recv().ok()
    }

    /// Wait for the handshake request and return its nonce.
    pub async fn handshake_nonce(&mut self) -> Nonce {
        // ---
        match self.next().await {
            ProtocolMessage::HandshakeRequest { nonce } => nonce,
            other => panic!("expected handshake request, got {other:?}"),
        }
    }

    pub async fn answer_handshake(&mut self) {
        // ---
        let nonce = self.handshake_nonce().await;
        self.send(ProtocolMessage::handshake_response(nonce)).await;
    }

    pub async fn send(&self, msg: ProtocolMessage) {
        self.adapter.send(&msg).await.expect("fake callee send failed");
    }
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
