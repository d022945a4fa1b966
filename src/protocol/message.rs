use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CorrelationId, Nonce, Result};

/// Name of the field that tags this protocol's traffic.
pub const MARKER_FIELD: &str = "marker";

/// Fixed value of [`MARKER_FIELD`] on every protocol message.
pub const MARKER: &str = "frame-rpc";

/// One of the five wire message shapes.
///
/// Serialized as an internally tagged JSON object:
///
/// ```text
/// { "marker": "frame-rpc", "type": "handshake-request",  "nonce": "…" }
/// { "marker": "frame-rpc", "type": "handshake-response", "nonce": "…" }
/// { "marker": "frame-rpc", "type": "request",  "id": "…", "method": "…", "args": [] }
/// { "marker": "frame-rpc", "type": "response", "id": "…", "result": … }
/// { "marker": "frame-rpc", "type": "error",    "id": "…", "error": "…" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProtocolMessage {
    // ---
    HandshakeRequest {
        nonce: Nonce,
    },

    HandshakeResponse {
        nonce: Nonce,
    },

    Request {
        id: CorrelationId,
        method: String,
        args: Vec<Value>,
    },

    Response {
        id: CorrelationId,
        /// Absent on the wire when the operation produced nothing.
        #[serde(default)]
        result: Value,
    },

    Error {
        id: CorrelationId,
        error: String,
    },
}

#[derive(Serialize)]
struct Tagged<'a> {
    marker: &'static str,
    #[serde(flatten)]
    message: &'a ProtocolMessage,
}

impl ProtocolMessage {
    // ---

    pub fn handshake_request(nonce: Nonce) -> Self {
        Self::HandshakeRequest { nonce }
    }

    pub fn handshake_response(nonce: Nonce) -> Self {
        Self::HandshakeResponse { nonce }
    }

    pub fn request(id: CorrelationId, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Request {
            id,
            method: method.into(),
            args,
        }
    }

    pub fn response(id: CorrelationId, result: Value) -> Self {
        Self::Response { id, result }
    }

    pub fn error(id: CorrelationId, error: impl Into<String>) -> Self {
        Self::Error {
            id,
            error: error.into(),
        }
    }

    /// Call identifier, for the three call-scoped shapes.
    pub fn id(&self) -> Option<&CorrelationId> {
        match self {
            Self::Request { id, .. } | Self::Response { id, .. } | Self::Error { id, .. } => {
                Some(id)
            }
            Self::HandshakeRequest { .. } | Self::HandshakeResponse { .. } => None,
        }
    }

    /// Wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeRequest { .. } => "handshake-request",
            Self::HandshakeResponse { .. } => "handshake-response",
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }

    /// Encode into a JSON value carrying the protocol marker.
    pub fn encode(&self) -> Result<Value> {
        // ---
        let value = serde_json::to_value(Tagged {
            marker: MARKER,
            message: self,
        })?;
        Ok(value)
    }

    /// Decode a JSON value received from the platform channel.
    ///
    /// The marker is checked before anything else; values without it are
    /// rejected without looking at their other fields. Returns `None` for
    /// anything that is not a well-formed protocol message.
    pub fn decode(value: &Value) -> Option<Self> {
        // ---
        let marker = value.as_object()?.get(MARKER_FIELD)?;

        if marker.as_str() != Some(MARKER) {
            return None;
        }

        Self::deserialize(value).ok()
    }
}

/// Narrowing predicate over arbitrary inbound payloads.
pub fn is_protocol_message(value: &Value) -> bool {
    ProtocolMessage::decode(value).is_some()
}
