//! Connection builder.
//!
//! Fluent alternative to filling in a [`ConnectConfig`] by hand.

use crate::{ConnectConfig, Connection, Origin, Result, RpcError, TransportPtr};
use std::time::Duration;

/// Builder for [`Connection`] instances.
///
/// The target origin is required; both timeouts fall back to their
/// defaults.
///
/// # Examples
///
/// ```no_run
/// use frame_rpc::{ConnectionBuilder, MemoryLink};
/// use std::time::Duration;
///
/// # async fn example() -> frame_rpc::Result<()> {
/// let link = MemoryLink::new("https://parent.example.com", "https://widget.example.com");
///
/// let connection = ConnectionBuilder::new(link.host())
///     .target_origin("https://widget.example.com")
///     .handshake_timeout(Duration::from_secs(2))
///     .call_timeout(Duration::from_millis(500))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionBuilder {
    // ---
    transport: TransportPtr,
    target_origin: Option<Origin>,
    handshake_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            target_origin: None,
            handshake_timeout: None,
            call_timeout: None,
        }
    }

    /// Set the origin the embedded context must have.
    ///
    /// Required. `"*"` disables origin isolation.
    pub fn target_origin(mut self, origin: impl Into<Origin>) -> Self {
        self.target_origin = Some(origin.into());
        self
    }

    /// Set the bound on load + handshake.
    ///
    /// Default: 5s.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Set the default per-call timeout.
    ///
    /// Default: 10s.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Resolve the configuration without connecting.
    ///
    /// # Errors
    ///
    /// `RpcError::MissingConfig` if no target origin was set.
    pub fn build_config(&self) -> Result<ConnectConfig> {
        // ---
        let target_origin = self
            .target_origin
            .clone()
            .ok_or_else(|| RpcError::MissingConfig("target_origin".into()))?;

        let mut config = ConnectConfig::new(target_origin);
        if let Some(timeout) = self.handshake_timeout {
            config = config.with_handshake_timeout(timeout);
        }
        if let Some(timeout) = self.call_timeout {
            config = config.with_call_timeout(timeout);
        }

        Ok(config)
    }

    /// Connect (consumes self).
    pub async fn connect(self) -> Result<Connection> {
        // ---
        let config = self.build_config()?;
        Connection::connect(self.transport, config).await
    }
}
