//! Top-level facade crate for meshcall.
//!
//! Re-exports the wire protocol, the signaling relay and the client
//! connection manager so users can depend on a single crate.

pub mod core {
    pub use meshcall_core::*;
}

pub mod relay {
    pub use meshcall_relay::*;
}

pub mod client {
    pub use meshcall_client::*;
}
