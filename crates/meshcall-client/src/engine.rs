//! Negotiation engine contract.
//!
//! The manager never interprets offers, answers or candidates. It hands
//! inbound signals to the engine for a peer and relays whatever the engine
//! emits back through the broker. Engines report back through an
//! [`EngineHandle`], which tags every event with the peer id and the engine
//! generation so events from a destroyed engine can be told apart.

use serde_json::Value;
use tokio::sync::mpsc;

use meshcall_core::protocol::SignalKind;

use crate::role::Role;

/// Connection state reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    /// Transient loss; the engine may recover on its own.
    Disconnected,
    /// Terminal failure with the engine's reason.
    Error(String),
    Closed,
}

impl PeerState {
    /// Parse the state strings browser engines report
    /// (`RTCPeerConnection.connectionState` plus `error:<reason>`).
    pub fn parse(s: &str) -> Self {
        if let Some(reason) = s.strip_prefix("error:") {
            return PeerState::Error(reason.trim().to_string());
        }
        match s {
            "new" => PeerState::New,
            "connecting" | "checking" => PeerState::Connecting,
            "connected" | "completed" => PeerState::Connected,
            "disconnected" => PeerState::Disconnected,
            "failed" => PeerState::Error("failed".to_string()),
            "closed" => PeerState::Closed,
            other => PeerState::Error(format!("unknown state: {other}")),
        }
    }

    /// Whether the peer context should be torn down on this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Error(_) | PeerState::Closed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            PeerState::New => "new",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Error(_) => "error",
            PeerState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind<S> {
    /// Negotiation data to deliver to the remote peer.
    Signal { kind: SignalKind, payload: Value },
    /// The remote media stream became available.
    Stream(S),
    StateChanged(PeerState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent<S> {
    pub peer_id: String,
    pub generation: u64,
    pub kind: EngineEventKind<S>,
}

/// Back-channel given to an engine at creation.
///
/// Emitting after the manager has gone away is a no-op.
#[derive(Debug)]
pub struct EngineHandle<S> {
    peer_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<EngineEvent<S>>,
}

impl<S> Clone for EngineHandle<S> {
    fn clone(&self) -> Self {
        Self {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            tx: self.tx.clone(),
        }
    }
}

impl<S> EngineHandle<S> {
    pub(crate) fn new(
        peer_id: String,
        generation: u64,
        tx: mpsc::UnboundedSender<EngineEvent<S>>,
    ) -> Self {
        Self {
            peer_id,
            generation,
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit_signal(&self, kind: SignalKind, payload: Value) {
        self.emit(EngineEventKind::Signal { kind, payload });
    }

    pub fn stream_available(&self, stream: S) {
        self.emit(EngineEventKind::Stream(stream));
    }

    pub fn state_changed(&self, state: PeerState) {
        self.emit(EngineEventKind::StateChanged(state));
    }

    /// The engine shut down on its own.
    pub fn closed(&self) {
        self.state_changed(PeerState::Closed);
    }

    fn emit(&self, kind: EngineEventKind<S>) {
        let _ = self.tx.send(EngineEvent {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            kind,
        });
    }
}

/// One negotiation with one remote peer.
pub trait NegotiationEngine: Send {
    type Stream;

    /// Attach (or replace) the local media stream. May be called before
    /// negotiation starts and again whenever the local stream changes.
    fn start_local_stream(&mut self, stream: &Self::Stream);

    /// Feed an inbound negotiation signal from the remote peer.
    fn accept_signal(&mut self, kind: SignalKind, payload: Value);

    /// Release all resources. Must be idempotent; nothing may be emitted
    /// through the handle afterwards.
    fn close(&mut self);
}

/// Creates engines for new peer contexts.
pub trait EngineFactory: Send {
    type Stream: Clone + Send + 'static;
    type Engine: NegotiationEngine<Stream = Self::Stream>;

    /// An offerer engine starts negotiating once it has a local stream;
    /// an answerer engine waits for the remote offer.
    fn create(&mut self, peer_id: &str, role: Role, handle: EngineHandle<Self::Stream>) -> Self::Engine;
}
