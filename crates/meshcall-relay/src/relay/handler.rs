use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use meshcall_core::error::{MeshError, Result};
use meshcall_core::protocol::envelope::{
    KEEP_ALIVE_JSON, TYPE_ACKNOWLEDGE, TYPE_DISCOVER, TYPE_LOCATION, TYPE_PING,
};
use meshcall_core::protocol::{RouteKey, WireEnvelope};

use crate::delivery::ConnectionGateway;
use crate::location::GeoLocator;
use crate::store::{expiry_after, ChatSession, PutCondition, SessionStore, WriteOutcome};

/// One inbound transport event.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub route: RouteKey,
    /// Handle of the socket the event arrived on.
    pub connection_id: String,
    pub source_ip: Option<IpAddr>,
    pub body: Option<String>,
}

impl RelayRequest {
    pub fn connect(connection_id: impl Into<String>, source_ip: Option<IpAddr>) -> Self {
        Self {
            route: RouteKey::Connect,
            connection_id: connection_id.into(),
            source_ip,
            body: None,
        }
    }

    pub fn disconnect(connection_id: impl Into<String>, source_ip: Option<IpAddr>) -> Self {
        Self {
            route: RouteKey::Disconnect,
            connection_id: connection_id.into(),
            source_ip,
            body: None,
        }
    }

    pub fn message(
        connection_id: impl Into<String>,
        source_ip: Option<IpAddr>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            route: RouteKey::Default,
            connection_id: connection_id.into(),
            source_ip,
            body: Some(body.into()),
        }
    }
}

pub struct Relay {
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) gateway: Arc<dyn ConnectionGateway>,
    locator: Arc<dyn GeoLocator>,
    session_ttl: Duration,
}

impl Relay {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateway: Arc<dyn ConnectionGateway>,
        locator: Arc<dyn GeoLocator>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            locator,
            session_ttl,
        }
    }

    pub async fn handle(&self, req: RelayRequest) -> Result<()> {
        match req.route {
            RouteKey::Connect => {
                tracing::debug!(connection = %req.connection_id, "connected");
                Ok(())
            }
            RouteKey::Disconnect => {
                // Records of this handle are reaped on the next failed push or by expiry.
                tracing::debug!(connection = %req.connection_id, "disconnected");
                Ok(())
            }
            RouteKey::Default => {
                let body = req
                    .body
                    .as_deref()
                    .ok_or_else(|| MeshError::BadRequest("default route requires a body".into()))?;
                let env = WireEnvelope::parse(body)?;
                self.process_message(env, body, &req).await
            }
        }
    }

    async fn process_message(&self, env: WireEnvelope, body: &str, req: &RelayRequest) -> Result<()> {
        tracing::debug!(
            connection = %req.connection_id,
            msg_type = %env.msg_type,
            from = ?env.from_id,
            to = ?env.to_id,
            "message"
        );

        match env.msg_type.as_str() {
            TYPE_DISCOVER => {
                let (room, client) = room_and_sender(&env)?;
                let token = env
                    .session_token()?
                    .ok_or_else(|| MeshError::BadRequest("discover requires a session token".into()))?;

                self.claim_session(room, client, &req.connection_id, &token).await?;

                let fanout = env.strip_session().to_json()?;
                self.broadcast(room, &fanout, &req.connection_id).await?;
                self.broadcast_location(&env, req).await
            }
            TYPE_PING => self
                .gateway
                .post(&req.connection_id, KEEP_ALIVE_JSON)
                .await
                .map_err(|e| MeshError::Delivery(e.to_string())),
            TYPE_ACKNOWLEDGE => {
                let mut ack = env.clone();
                ack.data = None;
                self.send_to(&ack, &ack.to_json()?).await?;
                self.broadcast_location(&env, req).await
            }
            // Negotiation payloads and everything else are forwarded untouched.
            _ => self.send_to(&env, body).await,
        }
    }

    /// Create or refresh the (room, client) record for this socket.
    ///
    /// A record held under a different session token is left alone.
    async fn claim_session(&self, room: &str, client: &str, connection_id: &str, token: &str) -> Result<WriteOutcome> {
        let session = ChatSession {
            room_id: room.to_string(),
            client_id: client.to_string(),
            connection_id: connection_id.to_string(),
            session_id: token.to_string(),
            expiry: expiry_after(self.session_ttl),
        };

        let outcome = self
            .store
            .put(session, PutCondition::AbsentOrSession(token.to_string()))
            .await?;

        match outcome {
            WriteOutcome::Written => {
                tracing::info!(room = %room, client = %client, connection = %connection_id, "session claimed");
            }
            WriteOutcome::ConditionFailed => {
                tracing::warn!(room = %room, client = %client, "slot held by another session token, not updated");
            }
        }
        Ok(outcome)
    }

    /// Point-to-point delivery to `toId`. Unknown recipients are dropped.
    async fn send_to(&self, env: &WireEnvelope, payload: &str) -> Result<()> {
        let (Some(room), Some(to)) = (env.room_id.as_deref(), env.to_id.as_deref()) else {
            tracing::debug!(msg_type = %env.msg_type, "no recipient, dropped");
            return Ok(());
        };

        match self.store.get(room, to).await? {
            Some(session) => {
                self.deliver(&session, payload).await?;
            }
            None => {
                tracing::debug!(room = %room, to = %to, msg_type = %env.msg_type, "recipient not in room, dropped");
            }
        }
        Ok(())
    }

    /// Tell the rest of the room where the sender is, if the address resolves.
    async fn broadcast_location(&self, env: &WireEnvelope, req: &RelayRequest) -> Result<()> {
        let Some(ip) = req.source_ip else {
            return Ok(());
        };
        let (room, client) = room_and_sender(env)?;

        let location = match self.locator.locate(ip).await {
            Ok(Some(loc)) => loc,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(%ip, error = %e, "location lookup failed");
                return Ok(());
            }
        };

        let data = serde_json::to_string(&location)
            .map_err(|e| MeshError::Internal(format!("location encode failed: {e}")))?;
        let out = WireEnvelope {
            room_id: Some(room.to_string()),
            from_id: Some(client.to_string()),
            to_id: Some(room.to_string()),
            msg_type: TYPE_LOCATION.to_string(),
            data: Some(data),
        };
        self.broadcast(room, &out.to_json()?, &req.connection_id).await?;
        Ok(())
    }
}

fn room_and_sender(env: &WireEnvelope) -> Result<(&str, &str)> {
    let room = env
        .room_id
        .as_deref()
        .ok_or_else(|| MeshError::BadRequest(format!("{} requires roomId", env.msg_type)))?;
    let client = env
        .from_id
        .as_deref()
        .ok_or_else(|| MeshError::BadRequest(format!("{} requires fromId", env.msg_type)))?;
    Ok((room, client))
}
