//! Message broker: the client's side of the relay.

mod ws;

use tokio::sync::mpsc;

use meshcall_core::error::{MeshError, Result};
use meshcall_core::protocol::{Envelope, Message};

use crate::session::SessionConfig;

pub use ws::WsBroker;

/// Outbound seam used by the connection manager.
///
/// The sender identity stamped as `fromId` comes from the same
/// `SessionConfig` the manager is built with.
pub trait Broker: Send {
    /// Send `message` to `to_id` (a peer id, or the room id for room-wide
    /// messages). Room and sender are filled in by the broker.
    fn send(&self, to_id: &str, message: Message) -> Result<()>;
}

/// Cloneable sender half of a [`WsBroker`].
///
/// Envelopes are queued while the socket is down and flushed after the
/// next successful connect.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    session: SessionConfig,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl BrokerHandle {
    pub(crate) fn new(session: SessionConfig, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Stamp room and sender onto `message`.
    pub fn envelope(&self, to_id: &str, message: Message) -> Envelope {
        Envelope::new(
            self.session.room_id.clone(),
            self.session.attendee_id.clone(),
            Some(to_id.to_string()),
            message,
        )
    }
}

impl Broker for BrokerHandle {
    fn send(&self, to_id: &str, message: Message) -> Result<()> {
        let env = self.envelope(to_id, message);
        self.tx
            .send(env)
            .map_err(|_| MeshError::Delivery("broker task has stopped".into()))
    }
}
