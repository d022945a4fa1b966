use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::{CorrelationId, Result, RpcError};

/// One in-flight call awaiting settlement.
///
/// Holds the channel back to the waiting caller and the abort handle of the
/// call's timer task. Settling consumes the call, so each call settles at
/// most once.
pub(super) struct PendingCall {
    // ---
    method: String,
    reply: oneshot::Sender<Result<Value>>,
    timer: AbortHandle,
}

impl PendingCall {
    pub fn new(method: impl Into<String>, reply: oneshot::Sender<Result<Value>>, timer: AbortHandle) -> Self {
        Self {
            method: method.into(),
            reply,
            timer,
        }
    }

    /// Settle from a response, an error message, or teardown: cancels the
    /// timer, then delivers.
    pub fn settle(self, outcome: Result<Value>) {
        // ---
        self.timer.abort();
        // The waiting future may already be gone; nothing to deliver to then.
        let _ = self.reply.send(outcome);
    }

    /// Settle from the timer itself.
    pub fn expire(self, timeout: Duration) {
        // ---
        let err = RpcError::CallTimeout {
            method: self.method,
            timeout_ms: timeout.as_millis(),
        };
        let _ = self.reply.send(Err(err));
    }

    /// Withdraw a call whose request never reached the wire.
    pub fn withdraw(self) {
        self.timer.abort();
    }
}

/// Pending calls of one connection, keyed by call id.
///
/// Removal from this map is the point where a call's outcome is decided:
/// whoever takes the entry first (response, error, timer, teardown) settles
/// it, and everyone after finds nothing.
pub(super) struct PendingCalls {
    // ---
    calls: HashMap<CorrelationId, PendingCall>,
}

impl PendingCalls {
    // ---

    pub fn new() -> Self {
        Self {
            calls: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: CorrelationId, call: PendingCall) {
        self.calls.insert(id, call);
    }

    pub fn take(&mut self, id: &CorrelationId) -> Option<PendingCall> {
        self.calls.remove(id)
    }

    /// Remove every pending call, for teardown.
    pub fn drain(&mut self) -> Vec<PendingCall> {
        self.calls.drain().map(|(_, call)| call).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
