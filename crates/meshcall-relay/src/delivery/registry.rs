use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use super::{ConnectionGateway, DeliveryError};

/// One socket's outbound queue sender.
#[derive(Clone)]
pub struct Connection {
    pub tx: mpsc::Sender<Message>,
}

#[derive(Clone)]
struct ConnectionEntry {
    conn: Connection,
    created_seq: u64,
}

/// Live sockets of this process: `connection_id -> Connection`.
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
    seq: AtomicU64,
    push_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(push_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            seq: AtomicU64::new(1),
            push_timeout,
        }
    }

    pub fn insert(&self, connection_id: String, conn: Connection) {
        let created_seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.connections
            .insert(connection_id, ConnectionEntry { conn, created_seq });
    }

    pub fn remove(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .remove(connection_id)
            .map(|(_, entry)| entry.conn)
    }

    pub fn get(&self, connection_id: &str) -> Option<Connection> {
        self.connections
            .get(connection_id)
            .map(|r| r.value().conn.clone())
    }

    /// Registration order, used in connection logs.
    pub fn seq_of(&self, connection_id: &str) -> Option<u64> {
        self.connections
            .get(connection_id)
            .map(|r| r.value().created_seq)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[async_trait]
impl ConnectionGateway for ConnectionRegistry {
    async fn post(&self, connection_id: &str, text: &str) -> Result<(), DeliveryError> {
        let conn = self.get(connection_id).ok_or(DeliveryError::Gone)?;
        if conn.tx.is_closed() {
            return Err(DeliveryError::Gone);
        }

        match timeout(self.push_timeout, conn.tx.send(Message::Text(text.to_owned()))).await {
            Ok(Ok(())) => Ok(()),
            // receiver dropped: the socket task has ended
            Ok(Err(_)) => Err(DeliveryError::Gone),
            Err(_) => Err(DeliveryError::Failed("push timed out".into())),
        }
    }
}
