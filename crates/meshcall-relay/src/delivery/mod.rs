//! Delivery: pushing a text payload to a client's connection handle.
//!
//! `Gone` is a distinguished outcome: it tells the relay the handle is dead
//! and its session record may be reaped.

mod registry;

pub use registry::{Connection, ConnectionRegistry};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The handle no longer refers to a live connection.
    #[error("connection gone")]
    Gone,
    /// Any other push failure (timeout, transport error). The record is kept.
    #[error("delivery failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ConnectionGateway: Send + Sync {
    async fn post(&self, connection_id: &str, text: &str) -> Result<(), DeliveryError>;
}
