//! Caller- and callee-side configuration.
//!
//! Both sides are anchored on an [`Origin`]: the caller names the origin it
//! expects the embedded context to have, the callee names the origin it
//! accepts requests from. `"*"` is accepted on either side but switches off
//! origin isolation.

use std::time::Duration;

use crate::Origin;

/// Default time allowed for the embedded context to load and answer the
/// handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default time allowed for each call to settle.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration for [`connect`](crate::connect).
///
/// # Example
///
/// ```
/// use frame_rpc::ConnectConfig;
/// use std::time::Duration;
///
/// let config = ConnectConfig::new("https://widget.example.com")
///     .with_call_timeout(Duration::from_secs(2));
///
/// assert_eq!(config.handshake_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    // ---
    /// Origin the embedded context must have. Outbound messages are tagged
    /// with it and inbound messages from any other origin are dropped.
    pub target_origin: Origin,

    /// Upper bound on load + handshake.
    ///
    /// Default: 5 seconds
    pub handshake_timeout: Duration,

    /// Upper bound on each call, from send to settlement.
    ///
    /// Default: 10 seconds
    pub call_timeout: Duration,
}

impl ConnectConfig {
    /// Create a config with default timeouts.
    pub fn new(target_origin: impl Into<Origin>) -> Self {
        Self {
            target_origin: target_origin.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Configuration for [`expose`](crate::expose).
#[derive(Debug, Clone)]
pub struct ExposeConfig {
    /// Origin requests are accepted from; every other origin is ignored.
    pub allowed_origin: Origin,
}

impl ExposeConfig {
    pub fn new(allowed_origin: impl Into<Origin>) -> Self {
        Self {
            allowed_origin: allowed_origin.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_defaults() {
        // ---
        let config = ConnectConfig::new("https://child.example.com");
        assert_eq!(config.handshake_timeout, Duration::from_millis(5000));
        assert_eq!(config.call_timeout, Duration::from_millis(10000));
        assert_eq!(config.target_origin, Origin::from("https://child.example.com"));
    }

    #[test]
    fn test_overrides() {
        // ---
        let config = ConnectConfig::new("*")
            .with_handshake_timeout(Duration::from_millis(50))
            .with_call_timeout(Duration::from_millis(75));
        assert!(config.target_origin.is_any());
        assert_eq!(config.handshake_timeout, Duration::from_millis(50));
        assert_eq!(config.call_timeout, Duration::from_millis(75));

        assert!(ExposeConfig::new("*").allowed_origin.is_any());
    }
}
