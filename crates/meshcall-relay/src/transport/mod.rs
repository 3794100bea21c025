//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the frame codec. Each socket maps to
//! one connection handle; its events are turned into `RelayRequest`s.

pub mod codec;
pub mod ws;
