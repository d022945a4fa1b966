use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::{Builder, Uuid};

use crate::log_warn;

/// Call identifier used to match a request with its response or error.
///
/// Formatted as a version 4 UUID in the standard 36-byte string form, e.g.
/// `550e8400-e29b-41d4-a9b6-446655440000`. Identifiers are carried in-band
/// inside protocol messages and are opaque to the channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    // ---

    /// Generate a new unpredictable correlation ID
    pub fn generate() -> Self {
        // ---
        Self(random_uuid().to_string())
    }

    /// Get the correlation ID as a string slice
    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Single-use handshake token.
///
/// A fresh nonce is drawn for every connection attempt; the embedded side
/// echoes it back verbatim and the caller only accepts its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a new unguessable nonce.
    pub fn generate() -> Self {
        Self(random_uuid().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Nonce {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Nonce {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Build a v4 UUID from the operating system's CSPRNG.
///
/// If the OS source is unavailable the bytes come from
/// [`fallback_bytes`] instead.
fn random_uuid() -> Uuid {
    // ---
    let mut bytes = [0u8; 16];

    if let Err(_err) = getrandom::getrandom(&mut bytes) {
        log_warn!("system random source unavailable ({_err}); using weak identifier fallback");
        bytes = fallback_bytes();
    }

    Builder::from_random_bytes(bytes).into_uuid()
}

/// Pseudo-random + timestamp composite.
///
/// NOT cryptographically safe: `RandomState` keys are only meant to resist
/// hash flooding. Good enough to keep identifiers distinct within one
/// connection, not to keep them secret.
fn fallback_bytes() -> [u8; 16] {
    // ---
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    // Every RandomState::new() is keyed differently, even on the same thread.
    let hi = RandomState::new().hash_one(now);
    let lo = RandomState::new().hash_one(now.rotate_left(64));

    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&hi.to_le_bytes());
    bytes[8..].copy_from_slice(&(lo ^ now as u64).to_le_bytes());
    bytes
}
