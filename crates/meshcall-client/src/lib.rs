//! meshcall client: turns the relay's envelope stream into one negotiation
//! state machine per remote peer.
//!
//! - `session`: identity of this tab (room, attendee id, session token).
//! - `role`: deterministic offerer/answerer assignment and flip leadership.
//! - `engine`: the contract a negotiation engine (ICE/SDP implementation)
//!   must satisfy to be driven by the manager.
//! - `broker`: relay client; stamps and sends envelopes, keeps the socket
//!   alive and re-announces after reconnects.
//! - `manager`: the connection manager itself.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod broker;
pub mod config;
pub mod engine;
pub mod manager;
pub mod role;
pub mod session;

pub use broker::{Broker, BrokerHandle, WsBroker};
pub use config::ClientConfig;
pub use engine::{EngineEvent, EngineEventKind, EngineFactory, EngineHandle, NegotiationEngine, PeerState};
pub use manager::{Command, ConnectionManager, ManagerEvent};
pub use role::Role;
pub use session::SessionConfig;
