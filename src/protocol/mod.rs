//! Protocol codec: the wire shapes exchanged between host and embedded
//! contexts.
//!
//! Every message carries a fixed `marker` field so that unrelated traffic
//! sharing the same platform channel can be discarded before any other field
//! is looked at.
mod message;

pub use message::{is_protocol_message, ProtocolMessage, MARKER, MARKER_FIELD};
