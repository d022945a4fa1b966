use thiserror::Error;

/// Errors surfaced by connections, exposures and transports.
///
/// Callee-side failures never appear here directly: the dispatcher turns
/// them into protocol error messages, which the caller sees as
/// [`RpcError::Remote`].
#[derive(Error, Debug)]
pub enum RpcError {
    /// The target execution context could not be addressed at connect time.
    #[error("target execution context is unreachable")]
    Unreachable,

    /// No valid handshake response arrived within the handshake timeout.
    #[error("handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u128 },

    /// No response arrived for a call within its timeout.
    #[error("call to \"{method}\" timed out after {timeout_ms}ms")]
    CallTimeout { method: String, timeout_ms: u128 },

    /// The remote operation failed; carries the remote message text verbatim.
    #[error("{0}")]
    Remote(String),

    /// The connection was destroyed while the call was pending, or before it
    /// was issued.
    #[error("connection destroyed")]
    ConnectionDestroyed,

    /// The channel adapter has already been destroyed.
    #[error("channel closed")]
    Closed,

    /// The platform transport rejected a delivery.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required configuration value was not supplied.
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

impl RpcError {
    /// True for the two timeout variants.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RpcError::HandshakeTimeout { .. } | RpcError::CallTimeout { .. }
        )
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
