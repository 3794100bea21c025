use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use meshcall_core::error::Result;

use super::{epoch_secs, ChatSession, PutCondition, SessionStore, WriteOutcome};

/// In-process session store.
///
/// Conditions are evaluated under the shard lock of the key's entry, so a
/// conditional write and the check it depends on are atomic.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<(String, String), ChatSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every record whose expiry has passed. Returns how many were removed.
    pub fn purge_expired(&self, now: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    fn now() -> u64 {
        epoch_secs(SystemTime::now())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, room: &str, client: &str) -> Result<Option<ChatSession>> {
        let now = Self::now();
        Ok(self
            .sessions
            .get(&(room.to_string(), client.to_string()))
            .map(|r| r.value().clone())
            .filter(|s| !s.is_expired(now)))
    }

    async fn put(&self, session: ChatSession, condition: PutCondition) -> Result<WriteOutcome> {
        let now = Self::now();
        match self.sessions.entry(session.key()) {
            Entry::Vacant(v) => {
                v.insert(session);
                Ok(WriteOutcome::Written)
            }
            Entry::Occupied(mut o) => {
                let allowed = match &condition {
                    PutCondition::AbsentOrSession(token) => {
                        o.get().is_expired(now) || &o.get().session_id == token
                    }
                };
                if allowed {
                    o.insert(session);
                    Ok(WriteOutcome::Written)
                } else {
                    Ok(WriteOutcome::ConditionFailed)
                }
            }
        }
    }

    async fn query_room(&self, room: &str) -> Result<Vec<ChatSession>> {
        let now = Self::now();
        Ok(self
            .sessions
            .iter()
            .filter(|r| r.key().0 == room && !r.value().is_expired(now))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete_if_connection(
        &self,
        room: &str,
        client: &str,
        connection: &str,
    ) -> Result<WriteOutcome> {
        let removed = self
            .sessions
            .remove_if(&(room.to_string(), client.to_string()), |_, s| {
                s.connection_id == connection
            });
        Ok(match removed {
            Some(_) => WriteOutcome::Written,
            None => WriteOutcome::ConditionFailed,
        })
    }
}
