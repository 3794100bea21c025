use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;

use meshcall_core::error::Result;

use crate::delivery::DeliveryError;
use crate::store::{ChatSession, WriteOutcome};

use super::Relay;

/// What happened to one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Handle was gone and its record was deleted.
    Reaped,
    /// Handle was gone but the record had already been refreshed or removed.
    StaleSkipped,
    /// Push failed for another reason; record kept.
    Failed,
}

impl Relay {
    /// Push `payload` to one session, reaping its record if the handle is gone.
    ///
    /// Only store errors are returned; delivery failures are folded into the
    /// outcome.
    pub(super) async fn deliver(&self, session: &ChatSession, payload: &str) -> Result<DeliveryOutcome> {
        match self.gateway.post(&session.connection_id, payload).await {
            Ok(()) => Ok(DeliveryOutcome::Delivered),
            Err(DeliveryError::Gone) => {
                let outcome = self
                    .store
                    .delete_if_connection(&session.room_id, &session.client_id, &session.connection_id)
                    .await?;
                match outcome {
                    WriteOutcome::Written => {
                        tracing::info!(
                            room = %session.room_id,
                            client = %session.client_id,
                            connection = %session.connection_id,
                            "connection gone, session removed"
                        );
                        Ok(DeliveryOutcome::Reaped)
                    }
                    WriteOutcome::ConditionFailed => {
                        tracing::debug!(
                            room = %session.room_id,
                            client = %session.client_id,
                            "connection gone, session already updated"
                        );
                        Ok(DeliveryOutcome::StaleSkipped)
                    }
                }
            }
            Err(DeliveryError::Failed(reason)) => {
                tracing::warn!(
                    room = %session.room_id,
                    client = %session.client_id,
                    %reason,
                    "delivery failed"
                );
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    /// Deliver to every session of `room` except the one on `except_connection`.
    ///
    /// Recipients are served concurrently. A store error on one recipient does
    /// not cut the others short; the first such error is returned after all
    /// deliveries have finished.
    pub(super) async fn broadcast(&self, room: &str, payload: &str, except_connection: &str) -> Result<usize> {
        let sessions = self.store.query_room(room).await?;

        let mut futs = FuturesUnordered::new();
        for session in sessions.iter().filter(|s| s.connection_id != except_connection) {
            futs.push(self.deliver(session, payload));
        }

        let mut delivered = 0usize;
        let mut first_err = None;
        while let Some(res) = futs.next().await {
            match res {
                Ok(DeliveryOutcome::Delivered) => delivered += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(room = %room, error = %e, "broadcast delivery store error");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }
}
