//! Signaling envelope (JSON).
//!
//! Wire shape:
//! `{"roomId": "...", "fromId": "...", "toId": "...", "type": "...", "data": "<json>"}`
//!
//! `data` is double-encoded: the envelope is JSON and `data` is a JSON
//! *string* whose content is parsed again. Deployed browser clients depend
//! on this shape.
//!
//! The relay only needs `WireEnvelope`; it never looks inside `data` except
//! for the session token carried by `discover`. Clients work with the typed
//! `Envelope`/`Message` pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};
use crate::protocol::location::Location;

pub const TYPE_DISCOVER: &str = "discover";
pub const TYPE_ACKNOWLEDGE: &str = "acknowledge";
pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_LOCATION: &str = "location";
pub const TYPE_ROLE_FLIP_REQUEST: &str = "roleFlipRequest";

/// Keep-alive reply the relay sends back for `ping`. Carries no envelope fields.
pub const KEEP_ALIVE_JSON: &str = r#"{"type":"pong"}"#;

/// Untyped envelope as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,
    /// Recipient id, the room id for room-wide messages, or null.
    #[serde(default)]
    pub to_id: Option<String>,
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// JSON-encoded payload (a string containing JSON), or null.
    #[serde(default)]
    pub data: Option<String>,
}

impl WireEnvelope {
    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| MeshError::BadRequest(format!("invalid envelope json: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| MeshError::Internal(format!("envelope encode failed: {e}")))
    }

    /// Session token carried by a `discover` envelope.
    ///
    /// Returns `Ok(None)` when `data` is absent or encodes `null`.
    pub fn session_token(&self) -> Result<Option<String>> {
        match self.data.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<Option<String>>(raw)
                .map_err(|e| MeshError::BadRequest(format!("discover session token: {e}"))),
        }
    }

    /// Copy of this envelope with `data` cleared. Used before fan-out of
    /// `discover` so participants never learn each other's session token.
    pub fn strip_session(&self) -> Self {
        Self {
            data: None,
            ..self.clone()
        }
    }
}

/// Opaque negotiation signal kinds. The payload is never interpreted by
/// the relay or the connection manager; only the negotiation engine reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Accept,
    Candidates,
    Signal,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Accept => "accept",
            SignalKind::Candidates => "candidates",
            SignalKind::Signal => "signal",
        }
    }

    pub fn from_type(s: &str) -> Option<Self> {
        match s {
            "offer" => Some(SignalKind::Offer),
            "accept" => Some(SignalKind::Accept),
            "candidates" => Some(SignalKind::Candidates),
            "signal" => Some(SignalKind::Signal),
            _ => None,
        }
    }
}

/// Typed message carried by an envelope, keyed by `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Announce presence in a room. The token is `None` once the relay has
    /// stripped it for fan-out.
    Discover { session_id: Option<String> },
    Acknowledge,
    Ping,
    Pong,
    Location(Location),
    RoleFlipRequest,
    /// Opaque negotiation payload for the peer's negotiation engine.
    Signal { kind: SignalKind, payload: Value },
}

impl Message {
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Discover { .. } => TYPE_DISCOVER,
            Message::Acknowledge => TYPE_ACKNOWLEDGE,
            Message::Ping => TYPE_PING,
            Message::Pong => TYPE_PONG,
            Message::Location(_) => TYPE_LOCATION,
            Message::RoleFlipRequest => TYPE_ROLE_FLIP_REQUEST,
            Message::Signal { kind, .. } => kind.as_str(),
        }
    }

    /// Encode the payload as the inner JSON string of `data`.
    fn encode_data(&self) -> Result<Option<String>> {
        let value = match self {
            Message::Discover { session_id: None } | Message::Ping | Message::Pong => {
                return Ok(None)
            }
            Message::Discover {
                session_id: Some(token),
            } => Value::String(token.clone()),
            Message::Acknowledge | Message::RoleFlipRequest => Value::Object(Default::default()),
            Message::Location(loc) => serde_json::to_value(loc)
                .map_err(|e| MeshError::Internal(format!("location encode failed: {e}")))?,
            Message::Signal { payload, .. } => payload.clone(),
        };
        serde_json::to_string(&value)
            .map(Some)
            .map_err(|e| MeshError::Internal(format!("data encode failed: {e}")))
    }

    fn decode(msg_type: &str, data: Option<&str>) -> Result<Self> {
        let value: Value = match data {
            None => Value::Null,
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| MeshError::BadRequest(format!("{msg_type} data is not json: {e}")))?,
        };

        match msg_type {
            TYPE_DISCOVER => match value {
                Value::Null => Ok(Message::Discover { session_id: None }),
                Value::String(s) => Ok(Message::Discover { session_id: Some(s) }),
                _ => Err(MeshError::BadRequest("discover data must be a string".into())),
            },
            TYPE_ACKNOWLEDGE => Ok(Message::Acknowledge),
            TYPE_PING => Ok(Message::Ping),
            TYPE_PONG => Ok(Message::Pong),
            TYPE_ROLE_FLIP_REQUEST => Ok(Message::RoleFlipRequest),
            TYPE_LOCATION => {
                let loc: Location = serde_json::from_value(value)
                    .map_err(|e| MeshError::BadRequest(format!("location data invalid: {e}")))?;
                Ok(Message::Location(loc))
            }
            other => match SignalKind::from_type(other) {
                Some(kind) => Ok(Message::Signal {
                    kind,
                    payload: value,
                }),
                None => Err(MeshError::BadRequest(format!("unknown message type: {other}"))),
            },
        }
    }
}

/// Typed envelope as seen by clients.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub room_id: String,
    pub from_id: String,
    pub to_id: Option<String>,
    pub message: Message,
}

impl Envelope {
    pub fn new(
        room_id: impl Into<String>,
        from_id: impl Into<String>,
        to_id: Option<String>,
        message: Message,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            from_id: from_id.into(),
            to_id,
            message,
        }
    }

    pub fn to_wire(&self) -> Result<WireEnvelope> {
        Ok(WireEnvelope {
            room_id: Some(self.room_id.clone()),
            from_id: Some(self.from_id.clone()),
            to_id: self.to_id.clone(),
            msg_type: self.message.type_name().to_string(),
            data: self.message.encode_data()?,
        })
    }

    pub fn from_wire(wire: WireEnvelope) -> Result<Self> {
        let room_id = wire
            .room_id
            .ok_or_else(|| MeshError::BadRequest("envelope missing roomId".into()))?;
        let from_id = wire
            .from_id
            .ok_or_else(|| MeshError::BadRequest("envelope missing fromId".into()))?;
        let message = Message::decode(&wire.msg_type, wire.data.as_deref())?;
        Ok(Self {
            room_id,
            from_id,
            to_id: wire.to_id,
            message,
        })
    }

    pub fn encode(&self) -> Result<String> {
        self.to_wire()?.to_json()
    }

    pub fn decode(s: &str) -> Result<Self> {
        Self::from_wire(WireEnvelope::parse(s)?)
    }
}

/// One inbound text frame on the client side.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Relay keep-alive reply; no envelope fields.
    KeepAlive,
    Envelope(Envelope),
}

/// Decode an inbound frame, separating keep-alive replies from envelopes.
pub fn decode_frame(s: &str) -> Result<Frame> {
    let wire = WireEnvelope::parse(s)?;
    if wire.msg_type == TYPE_PONG && wire.from_id.is_none() {
        return Ok(Frame::KeepAlive);
    }
    Envelope::from_wire(wire).map(Frame::Envelope)
}
