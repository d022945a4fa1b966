//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. Real
//! deployments supply their own binding to the host platform's message
//! primitive; the in-memory link ships with the crate.
//!
//! Domain code must not depend on transport-specific types.

mod memory;

pub use memory::{MemoryLink, MemoryTransport};
