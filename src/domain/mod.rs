//! Domain layer public interface.
//!
//! Abstractions over the host platform that are independent of any concrete
//! message primitive. Consumers import these symbols via this module, not by
//! referencing the individual files.

mod origin;
mod transport;

pub use origin::{Origin, ANY_ORIGIN};

pub use transport::{
    //
    Inbound,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportPtr,
};
