//! Connection manager: one negotiation context per remote peer.
//!
//! Contexts are created lazily when a peer first speaks (discover,
//! acknowledge, a negotiation signal or a flip request) and destroyed when
//! the engine reports a terminal state or the manager shuts down.
//!
//! Everything runs on the manager's own task. Engines and stuck timers post
//! back through channels tagged with the context generation; events whose
//! generation no longer matches the live context are dropped.

mod events;
mod timer;

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use meshcall_core::error::Result;
use meshcall_core::protocol::{Envelope, Message};

use crate::broker::Broker;
use crate::engine::{
    EngineEvent, EngineEventKind, EngineFactory, EngineHandle, NegotiationEngine, PeerState,
};
use crate::role::{assign_role, is_flip_leader, Role};
use crate::session::SessionConfig;

pub use events::{Command, ManagerEvent};
use timer::{StuckTimeout, StuckTimer};

struct PeerContext<E> {
    role: Role,
    state: PeerState,
    connected: bool,
    /// Survives a flip; at most one leader-initiated flip per peer.
    flip_attempted: bool,
    generation: u64,
    engine: E,
    stuck_timer: Option<StuckTimer>,
}

/// Per-peer negotiation driver.
///
/// Must be used from within a Tokio runtime: creating a context for a flip
/// leader spawns its stuck timer, so `handle_envelope` panics when called
/// outside one.
pub struct ConnectionManager<F: EngineFactory, B: Broker> {
    session: SessionConfig,
    broker: B,
    factory: F,
    stuck_timeout: Duration,

    peers: HashMap<String, PeerContext<F::Engine>>,
    local_stream: Option<F::Stream>,
    next_generation: u64,

    engine_tx: mpsc::UnboundedSender<EngineEvent<F::Stream>>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent<F::Stream>>,
    timer_tx: mpsc::UnboundedSender<StuckTimeout>,
    timer_rx: mpsc::UnboundedReceiver<StuckTimeout>,
    events: mpsc::UnboundedSender<ManagerEvent<F::Stream>>,
}

impl<F: EngineFactory, B: Broker> ConnectionManager<F, B> {
    pub fn new(
        session: SessionConfig,
        broker: B,
        factory: F,
        stuck_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ManagerEvent<F::Stream>>) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let mgr = Self {
            session,
            broker,
            factory,
            stuck_timeout,
            peers: HashMap::new(),
            local_stream: None,
            next_generation: 0,
            engine_tx,
            engine_rx,
            timer_tx,
            timer_rx,
            events,
        };
        (mgr, events_rx)
    }

    pub fn local_id(&self) -> &str {
        &self.session.attendee_id
    }

    pub fn role_of(&self, peer_id: &str) -> Option<Role> {
        self.peers.get(peer_id).map(|c| c.role)
    }

    pub fn state_of(&self, peer_id: &str) -> Option<&PeerState> {
        self.peers.get(peer_id).map(|c| &c.state)
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.peers.get(peer_id).is_some_and(|c| c.connected)
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.keys().map(String::as_str)
    }

    /// Apply one envelope from the relay.
    pub fn handle_envelope(&mut self, env: Envelope) -> Result<()> {
        if env.from_id == self.session.attendee_id {
            trace!("discarding own envelope");
            return Ok(());
        }
        if env.room_id != self.session.room_id {
            debug!(room_id = %env.room_id, "discarding envelope for another room");
            return Ok(());
        }

        let peer_id = env.from_id;
        match env.message {
            Message::Ping | Message::Pong => Ok(()),
            Message::Location(location) => {
                self.notify(ManagerEvent::LocationReceived { peer_id, location });
                Ok(())
            }
            Message::Discover { .. } => {
                self.ensure_peer(&peer_id);
                self.broker.send(&peer_id, Message::Acknowledge)
            }
            Message::Acknowledge => {
                self.ensure_peer(&peer_id);
                Ok(())
            }
            Message::RoleFlipRequest => {
                info!(peer_id = %peer_id, "peer requested role flip");
                self.flip_roles(&peer_id);
                Ok(())
            }
            Message::Signal { kind, payload } => {
                self.ensure_peer(&peer_id);
                if let Some(ctx) = self.peers.get_mut(&peer_id) {
                    ctx.engine.accept_signal(kind, payload);
                }
                Ok(())
            }
        }
    }

    /// Apply one event reported by an engine.
    pub fn handle_engine_event(&mut self, ev: EngineEvent<F::Stream>) -> Result<()> {
        let Some(ctx) = self.peers.get_mut(&ev.peer_id) else {
            trace!(peer_id = %ev.peer_id, "event for unknown peer");
            return Ok(());
        };
        if ctx.generation != ev.generation {
            debug!(
                peer_id = %ev.peer_id,
                stale = ev.generation,
                live = ctx.generation,
                "dropping event from destroyed engine"
            );
            return Ok(());
        }

        let peer_id = ev.peer_id;
        match ev.kind {
            EngineEventKind::Signal { kind, payload } => {
                self.broker.send(&peer_id, Message::Signal { kind, payload })
            }
            EngineEventKind::Stream(stream) => {
                self.notify(ManagerEvent::StreamAvailable { peer_id, stream });
                Ok(())
            }
            EngineEventKind::StateChanged(state) => {
                ctx.state = state.clone();
                let connected = state == PeerState::Connected;
                if connected {
                    ctx.connected = true;
                    ctx.stuck_timer = None;
                }
                let terminal = state.is_terminal();

                debug!(peer_id = %peer_id, state = state.as_str(), "peer state changed");
                self.notify(ManagerEvent::PeerStateChanged {
                    peer_id: peer_id.clone(),
                    state,
                });
                if connected {
                    info!(peer_id = %peer_id, "peer connected");
                    self.notify(ManagerEvent::PeerConnected { peer_id });
                } else if terminal {
                    self.teardown(&peer_id);
                }
                Ok(())
            }
        }
    }

    /// Replace the local stream on every live engine and remember it for
    /// contexts created later.
    pub fn refresh_local_stream(&mut self, stream: F::Stream) {
        for ctx in self.peers.values_mut() {
            ctx.engine.start_local_stream(&stream);
        }
        self.local_stream = Some(stream);
    }

    /// Process queued engine events and fired stuck timers without blocking.
    /// Returns the number of items handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(ev) = self.engine_rx.try_recv() {
                if let Err(e) = self.handle_engine_event(ev) {
                    warn!(error = %e, code = e.client_code().as_str(), "engine event failed");
                }
                handled += 1;
                continue;
            }
            if let Ok(t) = self.timer_rx.try_recv() {
                if let Err(e) = self.handle_stuck_timeout(t) {
                    warn!(error = %e, code = e.client_code().as_str(), "stuck timeout failed");
                }
                handled += 1;
                continue;
            }
            return handled;
        }
    }

    /// Drive the manager until the inbound stream ends or a shutdown command
    /// arrives. All contexts are closed on exit.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Envelope>,
        mut commands: mpsc::Receiver<Command<F::Stream>>,
    ) {
        loop {
            // engine events first: a queued `Connected` must be seen before a
            // stuck timer that fired at the same time
            tokio::select! {
                biased;

                Some(ev) = self.engine_rx.recv() => {
                    if let Err(e) = self.handle_engine_event(ev) {
                        warn!(error = %e, code = e.client_code().as_str(), "engine event failed");
                    }
                }
                Some(t) = self.timer_rx.recv() => {
                    if let Err(e) = self.handle_stuck_timeout(t) {
                        warn!(error = %e, code = e.client_code().as_str(), "stuck timeout failed");
                    }
                }
                env = inbound.recv() => {
                    let Some(env) = env else { break };
                    if let Err(e) = self.handle_envelope(env) {
                        warn!(error = %e, code = e.client_code().as_str(), "envelope handling failed");
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::RefreshLocalStream(stream)) => self.refresh_local_stream(stream),
                    Some(Command::Shutdown) | None => break,
                },
            }
        }
        self.close_all();
    }

    /// Close every engine and forget every peer.
    pub fn close_all(&mut self) {
        let ids: Vec<String> = self.peers.keys().cloned().collect();
        for id in ids {
            self.teardown(&id);
        }
    }

    fn handle_stuck_timeout(&mut self, t: StuckTimeout) -> Result<()> {
        // state reports already queued count as arriving before the timeout
        while let Ok(ev) = self.engine_rx.try_recv() {
            if let Err(e) = self.handle_engine_event(ev) {
                warn!(error = %e, code = e.client_code().as_str(), "engine event failed");
            }
        }

        let Some(ctx) = self.peers.get_mut(&t.peer_id) else {
            return Ok(());
        };
        if ctx.generation != t.generation || ctx.connected || ctx.flip_attempted {
            return Ok(());
        }
        ctx.flip_attempted = true;
        ctx.stuck_timer = None;

        warn!(peer_id = %t.peer_id, "peer did not connect; flipping roles");
        let sent = self.broker.send(&t.peer_id, Message::RoleFlipRequest);
        self.flip_roles(&t.peer_id);
        sent
    }

    fn ensure_peer(&mut self, peer_id: &str) {
        if !self.peers.contains_key(peer_id) {
            let role = assign_role(&self.session.attendee_id, peer_id);
            self.create_peer(peer_id, role, false);
        }
    }

    /// Destroy the peer's engine and recreate it with the opposite role.
    fn flip_roles(&mut self, peer_id: &str) {
        let (role, flip_attempted) = match self.peers.remove(peer_id) {
            Some(mut ctx) => {
                ctx.engine.close();
                (ctx.role.flipped(), ctx.flip_attempted)
            }
            None => (assign_role(&self.session.attendee_id, peer_id).flipped(), false),
        };
        info!(peer_id = %peer_id, role = %role, "roles flipped");
        self.create_peer(peer_id, role, flip_attempted);
    }

    fn create_peer(&mut self, peer_id: &str, role: Role, flip_attempted: bool) {
        self.next_generation += 1;
        let generation = self.next_generation;

        let handle = EngineHandle::new(peer_id.to_string(), generation, self.engine_tx.clone());
        let mut engine = self.factory.create(peer_id, role, handle);
        if let Some(stream) = &self.local_stream {
            engine.start_local_stream(stream);
        }

        let stuck_timer = (!flip_attempted && is_flip_leader(&self.session.attendee_id, peer_id))
            .then(|| {
                StuckTimer::arm(
                    peer_id.to_string(),
                    generation,
                    self.stuck_timeout,
                    self.timer_tx.clone(),
                )
            });

        self.peers.insert(
            peer_id.to_string(),
            PeerContext {
                role,
                state: PeerState::New,
                connected: false,
                flip_attempted,
                generation,
                engine,
                stuck_timer,
            },
        );
        info!(peer_id = %peer_id, role = %role, generation, "peer context created");
        self.notify(ManagerEvent::PeerJoined {
            peer_id: peer_id.to_string(),
            role,
        });
    }

    fn teardown(&mut self, peer_id: &str) {
        if let Some(mut ctx) = self.peers.remove(peer_id) {
            ctx.engine.close();
            info!(peer_id = %peer_id, "peer context closed");
            self.notify(ManagerEvent::PeerClosed {
                peer_id: peer_id.to_string(),
            });
        }
    }

    fn notify(&self, ev: ManagerEvent<F::Stream>) {
        let _ = self.events.send(ev);
    }
}
