//! Signaling relay.
//!
//! One `Relay::handle` call per inbound transport event. The relay keeps no
//! state between calls: everything it knows about a room lives in the
//! `SessionStore`, and everything it sends goes through a `ConnectionGateway`.

mod fanout;
mod handler;

pub use fanout::DeliveryOutcome;
pub use handler::{Relay, RelayRequest};
