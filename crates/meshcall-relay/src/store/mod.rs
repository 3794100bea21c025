//! Session store: one `ChatSession` per (room, client), last writer wins.
//!
//! The relay only needs get/put/query/delete. Concurrency control is
//! condition-based: `put` and `delete_if_connection` evaluate their
//! condition atomically against the stored record and report
//! `WriteOutcome::ConditionFailed` instead of erroring, so callers can treat a
//! lost race as a benign no-op.

mod memory;

pub use memory::MemorySessionStore;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use meshcall_core::error::Result;

pub const ROOM_ATTRIBUTE: &str = "Room";
pub const CLIENT_ATTRIBUTE: &str = "Client";
pub const CONNECTION_ATTRIBUTE: &str = "Connection";
pub const SESSION_ATTRIBUTE: &str = "Session";
pub const EXPIRY_ATTRIBUTE: &str = "Expiry";

/// Persisted record for one participant of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(rename = "Room")]
    pub room_id: String,
    #[serde(rename = "Client")]
    pub client_id: String,
    /// Relay address handle; changes on every reconnect.
    #[serde(rename = "Connection")]
    pub connection_id: String,
    /// Per-tab token guarding the slot against other tabs.
    #[serde(rename = "Session")]
    pub session_id: String,
    /// Epoch seconds after which the record is treated as absent.
    #[serde(rename = "Expiry")]
    pub expiry: u64,
}

impl ChatSession {
    pub fn key(&self) -> (String, String) {
        (self.room_id.clone(), self.client_id.clone())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}

/// Condition attached to a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Write only if no live record exists for the key, or the stored
    /// session token equals this one.
    AbsentOrSession(String),
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    ConditionFailed,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, room: &str, client: &str) -> Result<Option<ChatSession>>;

    async fn put(&self, session: ChatSession, condition: PutCondition) -> Result<WriteOutcome>;

    /// All live records of a room.
    async fn query_room(&self, room: &str) -> Result<Vec<ChatSession>>;

    /// Delete the record only if its stored connection handle still equals
    /// `connection`.
    async fn delete_if_connection(
        &self,
        room: &str,
        client: &str,
        connection: &str,
    ) -> Result<WriteOutcome>;
}

pub fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Expiry stamp `ttl` from now.
pub fn expiry_after(ttl: Duration) -> u64 {
    epoch_secs(SystemTime::now()).saturating_add(ttl.as_secs())
}
