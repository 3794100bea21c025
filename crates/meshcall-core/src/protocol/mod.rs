//! Signaling wire protocol.
//!
//! - `envelope`: the JSON envelope exchanged through the relay, with its
//!   double-encoded `data` field, and the typed message union keyed by `type`.
//! - `location`: the geolocation record carried by `location` envelopes.
//! - `route`: transport route discriminators (`$connect`, `$disconnect`,
//!   `$default`).
//!
//! All decoders are panic-free: malformed input is reported as `MeshError`.

pub mod envelope;
pub mod location;
pub mod route;

pub use envelope::{decode_frame, Envelope, Frame, Message, SignalKind, WireEnvelope};
pub use location::Location;
pub use route::RouteKey;
