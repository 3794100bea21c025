//! meshcall core: wire-level signaling primitives and the shared error type.
//!
//! This crate defines the envelope exchanged between browsers through the
//! relay, the typed message union carried inside it, and the error surface
//! shared by the relay and the client. It carries no transport or runtime
//! dependencies so both sides can link it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed frames surface as `MeshError::BadRequest` so a hostile or
//! confused peer cannot crash either side.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{MeshError, Result};
