//! meshcall relay library entry.
//!
//! This crate wires the WebSocket transport, the session store, the
//! connection delivery gateway, and the signaling relay into a single
//! process. It is consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod delivery;
pub mod location;
pub mod ops;
pub mod relay;
pub mod router;
pub mod store;
pub mod transport;
