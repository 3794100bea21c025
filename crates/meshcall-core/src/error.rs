//! Shared error type across meshcall crates.

use thiserror::Error;

/// Stable error codes, used in logs and in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed message.
    BadRequest,
    /// A referenced peer or record does not exist.
    NotFound,
    /// Session store failure.
    Store,
    /// Push to a connection handle failed.
    Delivery,
    /// Unsupported config or protocol version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and JSON replies.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Store => "STORE",
            ClientCode::Delivery => "DELIVERY",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type used by core, relay and client.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("session store: {0}")]
    Store(String),
    #[error("delivery: {0}")]
    Delivery(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl MeshError {
    /// Map error to a stable code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MeshError::BadRequest(_) => ClientCode::BadRequest,
            MeshError::NotFound(_) => ClientCode::NotFound,
            MeshError::Store(_) => ClientCode::Store,
            MeshError::Delivery(_) => ClientCode::Delivery,
            MeshError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MeshError::Internal(_) => ClientCode::Internal,
        }
    }
}
