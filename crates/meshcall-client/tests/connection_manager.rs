#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use meshcall_client::engine::{EngineFactory, EngineHandle, NegotiationEngine, PeerState};
use meshcall_client::{Broker, Command, ConnectionManager, ManagerEvent, Role, SessionConfig};
use meshcall_core::error::Result;
use meshcall_core::protocol::{Envelope, Location, Message, SignalKind};

const ROOM: &str = "room-1";
const STUCK: Duration = Duration::from_secs(10);

#[derive(Clone, Default)]
struct RecordingBroker {
    sent: Arc<Mutex<Vec<(String, Message)>>>,
}

impl RecordingBroker {
    fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }

    fn take(&self) -> Vec<(String, Message)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn flip_requests(&self) -> usize {
        self.sent()
            .iter()
            .filter(|(_, m)| *m == Message::RoleFlipRequest)
            .count()
    }
}

impl Broker for RecordingBroker {
    fn send(&self, to_id: &str, message: Message) -> Result<()> {
        self.sent.lock().unwrap().push((to_id.to_string(), message));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    LocalStream(String),
    Signal(SignalKind, Value),
    Close,
}

struct ScriptedEngine {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl NegotiationEngine for ScriptedEngine {
    type Stream = String;

    fn start_local_stream(&mut self, stream: &String) {
        self.calls.lock().unwrap().push(Call::LocalStream(stream.clone()));
    }

    fn accept_signal(&mut self, kind: SignalKind, payload: Value) {
        self.calls.lock().unwrap().push(Call::Signal(kind, payload));
    }

    fn close(&mut self) {
        self.calls.lock().unwrap().push(Call::Close);
    }
}

struct Created {
    peer_id: String,
    role: Role,
    handle: EngineHandle<String>,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[derive(Clone, Default)]
struct ScriptedFactory {
    created: Arc<Mutex<Vec<Created>>>,
}

impl ScriptedFactory {
    fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    fn handle(&self, i: usize) -> EngineHandle<String> {
        self.created.lock().unwrap()[i].handle.clone()
    }

    fn calls(&self, i: usize) -> Vec<Call> {
        self.created.lock().unwrap()[i].calls.lock().unwrap().clone()
    }

    fn role(&self, i: usize) -> Role {
        self.created.lock().unwrap()[i].role
    }

    fn peer(&self, i: usize) -> String {
        self.created.lock().unwrap()[i].peer_id.clone()
    }
}

impl EngineFactory for ScriptedFactory {
    type Stream = String;
    type Engine = ScriptedEngine;

    fn create(&mut self, peer_id: &str, role: Role, handle: EngineHandle<String>) -> ScriptedEngine {
        let calls = Arc::new(Mutex::new(Vec::new()));
        self.created.lock().unwrap().push(Created {
            peer_id: peer_id.to_string(),
            role,
            handle,
            calls: calls.clone(),
        });
        ScriptedEngine { calls }
    }
}

struct Harness {
    mgr: ConnectionManager<ScriptedFactory, RecordingBroker>,
    events: mpsc::UnboundedReceiver<ManagerEvent<String>>,
    broker: RecordingBroker,
    factory: ScriptedFactory,
}

impl Harness {
    fn new(local: &str) -> Self {
        let broker = RecordingBroker::default();
        let factory = ScriptedFactory::default();
        let session = SessionConfig::with_ids(ROOM, local, format!("token-{local}"));
        let (mgr, events) = ConnectionManager::new(session, broker.clone(), factory.clone(), STUCK);
        Self {
            mgr,
            events,
            broker,
            factory,
        }
    }

    fn deliver(&mut self, from: &str, message: Message) {
        let to = Some(self.mgr.local_id().to_string());
        self.mgr
            .handle_envelope(Envelope::new(ROOM, from, to, message))
            .unwrap();
    }

    fn events(&mut self) -> Vec<ManagerEvent<String>> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

fn discover() -> Message {
    Message::Discover { session_id: None }
}

/// Deliver everything `from` has sent to `to`, as the relay would.
fn route(from: &Harness, to: &mut Harness) {
    let local = from.mgr.local_id().to_string();
    for (dest, message) in from.broker.take() {
        if dest == to.mgr.local_id() {
            to.deliver(&local, message);
        }
    }
}

#[tokio::test]
async fn discover_creates_context_and_acknowledges() {
    let mut h = Harness::new("bbb");
    h.deliver("aaa", discover());

    assert_eq!(h.mgr.role_of("aaa"), Some(Role::Answerer));
    assert_eq!(h.broker.sent(), vec![("aaa".to_string(), Message::Acknowledge)]);
    assert_eq!(h.factory.count(), 1);
    assert_eq!(h.factory.peer(0), "aaa");
    assert_eq!(
        h.events(),
        vec![ManagerEvent::PeerJoined {
            peer_id: "aaa".into(),
            role: Role::Answerer
        }]
    );

    // a repeated discover keeps the context
    h.deliver("aaa", discover());
    assert_eq!(h.factory.count(), 1);
    assert_eq!(h.broker.sent().len(), 2);
}

#[tokio::test]
async fn two_clients_take_complementary_roles() {
    let mut a = Harness::new("aaa");
    let mut b = Harness::new("bbb");

    a.deliver("bbb", discover());
    b.deliver("aaa", discover());

    assert_eq!(a.mgr.role_of("bbb"), Some(Role::Offerer));
    assert_eq!(b.mgr.role_of("aaa"), Some(Role::Answerer));
}

#[tokio::test]
async fn acknowledge_from_unknown_peer_creates_context_without_reply() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", Message::Acknowledge);

    assert_eq!(h.mgr.role_of("bbb"), Some(Role::Offerer));
    assert!(h.broker.sent().is_empty());
}

#[tokio::test]
async fn own_and_foreign_room_envelopes_are_ignored() {
    let mut h = Harness::new("aaa");
    h.deliver("aaa", discover());
    h.mgr
        .handle_envelope(Envelope::new("room-2", "bbb", None, discover()))
        .unwrap();

    assert_eq!(h.mgr.peers().count(), 0);
    assert!(h.broker.sent().is_empty());
}

#[tokio::test]
async fn inbound_signal_reaches_engine_unchanged() {
    let mut h = Harness::new("bbb");
    let offer = json!({"sdp": "v=0...", "type": "offer"});
    h.deliver(
        "aaa",
        Message::Signal {
            kind: SignalKind::Offer,
            payload: offer.clone(),
        },
    );

    assert_eq!(h.factory.count(), 1);
    assert_eq!(h.factory.calls(0), vec![Call::Signal(SignalKind::Offer, offer)]);
    // no acknowledge for signals
    assert!(h.broker.sent().is_empty());
}

#[tokio::test]
async fn engine_signals_are_sent_to_the_peer() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    h.broker.take();

    let cands = json!([{"candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host"}]);
    h.factory.handle(0).emit_signal(SignalKind::Candidates, cands.clone());
    assert_eq!(h.mgr.process_pending(), 1);

    assert_eq!(
        h.broker.sent(),
        vec![(
            "bbb".to_string(),
            Message::Signal {
                kind: SignalKind::Candidates,
                payload: cands
            }
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn stuck_leader_flips_exactly_once() {
    let mut h = Harness::new("bbb");
    h.deliver("aaa", discover());
    assert_eq!(h.mgr.role_of("aaa"), Some(Role::Answerer));

    tokio::time::sleep(STUCK + Duration::from_millis(1)).await;
    h.mgr.process_pending();

    assert_eq!(h.broker.flip_requests(), 1);
    assert_eq!(h.mgr.role_of("aaa"), Some(Role::Offerer));
    assert_eq!(h.factory.count(), 2);
    assert_eq!(h.factory.role(1), Role::Offerer);
    assert!(h.factory.calls(0).contains(&Call::Close));

    // the flipped context never arms another timer
    tokio::time::sleep(STUCK * 3).await;
    h.mgr.process_pending();
    assert_eq!(h.broker.flip_requests(), 1);
    assert_eq!(h.factory.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn connected_peer_is_never_flipped() {
    let mut h = Harness::new("bbb");
    h.deliver("aaa", discover());

    h.factory.handle(0).state_changed(PeerState::Connecting);
    h.factory.handle(0).state_changed(PeerState::Connected);
    h.mgr.process_pending();
    assert!(h.mgr.is_connected("aaa"));
    assert_eq!(h.mgr.state_of("aaa"), Some(&PeerState::Connected));

    tokio::time::sleep(STUCK * 2).await;
    h.mgr.process_pending();

    assert_eq!(h.broker.flip_requests(), 0);
    assert_eq!(h.factory.count(), 1);
    let events = h.events();
    assert!(events.contains(&ManagerEvent::PeerConnected {
        peer_id: "aaa".into()
    }));
}

#[tokio::test(start_paused = true)]
async fn follower_never_starts_a_flip() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());

    tokio::time::sleep(STUCK * 2).await;
    h.mgr.process_pending();

    assert_eq!(h.broker.flip_requests(), 0);
    assert_eq!(h.mgr.role_of("bbb"), Some(Role::Offerer));
}

#[tokio::test]
async fn flip_request_recreates_engine_with_opposite_role() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    let old = h.factory.handle(0);
    h.deliver("bbb", Message::RoleFlipRequest);

    assert_eq!(h.mgr.role_of("bbb"), Some(Role::Answerer));
    assert_eq!(h.factory.count(), 2);
    assert!(h.factory.calls(0).contains(&Call::Close));
    assert_ne!(old.generation(), h.factory.handle(1).generation());

    // events from the destroyed engine are ignored
    h.broker.take();
    old.emit_signal(SignalKind::Offer, json!({"sdp": "stale"}));
    old.state_changed(PeerState::Connected);
    h.mgr.process_pending();
    assert!(h.broker.sent().is_empty());
    assert!(!h.mgr.is_connected("bbb"));
}

#[tokio::test(start_paused = true)]
async fn stuck_pair_recovers_through_one_flip() {
    let mut a = Harness::new("aaa");
    let mut b = Harness::new("bbb");

    // b joins second: its discover reaches a, a acknowledges
    a.deliver("bbb", discover());
    route(&a, &mut b);
    assert_eq!(a.mgr.role_of("bbb"), Some(Role::Offerer));
    assert_eq!(b.mgr.role_of("aaa"), Some(Role::Answerer));

    // a's offer never arrives; b leads the flip
    tokio::time::sleep(STUCK + Duration::from_millis(1)).await;
    b.mgr.process_pending();
    a.mgr.process_pending();
    assert_eq!(b.broker.flip_requests(), 1);
    route(&b, &mut a);

    assert_eq!(a.mgr.role_of("bbb"), Some(Role::Answerer));
    assert_eq!(b.mgr.role_of("aaa"), Some(Role::Offerer));

    tokio::time::sleep(STUCK * 3).await;
    b.mgr.process_pending();
    a.mgr.process_pending();
    assert_eq!(b.broker.flip_requests(), 0);
    assert_eq!(a.broker.flip_requests(), 0);
}

#[tokio::test]
async fn terminal_state_tears_the_context_down() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    h.events();

    let handle = h.factory.handle(0);
    handle.state_changed(PeerState::parse("error: ice failed"));
    h.mgr.process_pending();

    assert_eq!(h.mgr.role_of("bbb"), None);
    assert!(h.factory.calls(0).contains(&Call::Close));
    let events = h.events();
    assert_eq!(
        events.last(),
        Some(&ManagerEvent::PeerClosed {
            peer_id: "bbb".into()
        })
    );

    // late events from the closed engine find no context
    handle.state_changed(PeerState::Connected);
    h.mgr.process_pending();
    assert_eq!(h.mgr.peers().count(), 0);

    // the peer speaking again starts over
    h.deliver("bbb", Message::Acknowledge);
    assert_eq!(h.factory.count(), 2);
}

#[tokio::test]
async fn location_is_reported_without_touching_negotiation() {
    let mut h = Harness::new("aaa");
    let loc = Location {
        city_name: Some("Leeds".into()),
        country_code: Some("GB".into()),
        ..Location::default()
    };
    h.deliver("bbb", Message::Location(loc.clone()));

    assert_eq!(h.mgr.peers().count(), 0);
    assert_eq!(
        h.events(),
        vec![ManagerEvent::LocationReceived {
            peer_id: "bbb".into(),
            location: loc
        }]
    );
}

#[tokio::test]
async fn local_stream_reaches_current_and_future_engines() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    h.mgr.refresh_local_stream("cam-1".into());
    h.deliver("ccc", discover());

    assert_eq!(h.factory.calls(0), vec![Call::LocalStream("cam-1".into())]);
    assert_eq!(h.factory.calls(1), vec![Call::LocalStream("cam-1".into())]);

    h.mgr.refresh_local_stream("screen".into());
    assert_eq!(h.factory.calls(0).last(), Some(&Call::LocalStream("screen".into())));
}

#[tokio::test]
async fn remote_stream_is_surfaced() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    h.events();

    h.factory.handle(0).stream_available("remote-bbb".into());
    h.mgr.process_pending();
    assert_eq!(
        h.events(),
        vec![ManagerEvent::StreamAvailable {
            peer_id: "bbb".into(),
            stream: "remote-bbb".into()
        }]
    );
}

#[tokio::test]
async fn run_loop_handles_envelopes_until_shutdown() {
    let broker = RecordingBroker::default();
    let factory = ScriptedFactory::default();
    let session = SessionConfig::with_ids(ROOM, "aaa", "token-aaa");
    let (mgr, mut events) = ConnectionManager::new(session, broker.clone(), factory.clone(), STUCK);

    let (in_tx, in_rx) = mpsc::channel(8);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let task = tokio::spawn(mgr.run(in_rx, cmd_rx));

    in_tx
        .send(Envelope::new(ROOM, "bbb", Some("aaa".into()), discover()))
        .await
        .unwrap();
    let joined = events.recv().await.unwrap();
    assert_eq!(
        joined,
        ManagerEvent::PeerJoined {
            peer_id: "bbb".into(),
            role: Role::Offerer
        }
    );

    cmd_tx.send(Command::Shutdown).await.unwrap();
    task.await.unwrap();

    assert_eq!(broker.sent(), vec![("bbb".to_string(), Message::Acknowledge)]);
    assert!(factory.calls(0).contains(&Call::Close));
    assert_eq!(
        events.recv().await,
        Some(ManagerEvent::PeerClosed {
            peer_id: "bbb".into()
        })
    );
}

#[tokio::test]
async fn engine_closing_itself_removes_the_peer() {
    let mut h = Harness::new("aaa");
    h.deliver("bbb", discover());
    h.deliver("ccc", discover());

    h.factory.handle(1).closed();
    h.mgr.process_pending();

    assert_eq!(h.mgr.peers().collect::<Vec<_>>(), vec!["bbb"]);
    assert!(!h.factory.calls(0).contains(&Call::Close));
}

#[tokio::test(start_paused = true)]
async fn run_loop_sees_connected_before_a_simultaneous_timeout() {
    let broker = RecordingBroker::default();
    let factory = ScriptedFactory::default();
    let session = SessionConfig::with_ids(ROOM, "bbb", "token-bbb");
    let (mut mgr, mut events) = ConnectionManager::new(session, broker.clone(), factory.clone(), STUCK);

    mgr.handle_envelope(Envelope::new(ROOM, "aaa", Some("bbb".into()), discover()))
        .unwrap();
    factory.handle(0).state_changed(PeerState::Connected);

    // the timer fires while the connected report is still queued
    tokio::time::sleep(STUCK + Duration::from_millis(1)).await;

    let (_in_tx, in_rx) = mpsc::channel(8);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    cmd_tx.send(Command::Shutdown).await.unwrap();
    mgr.run(in_rx, cmd_rx).await;

    assert_eq!(broker.flip_requests(), 0);
    assert_eq!(factory.count(), 1);

    let mut joined = 0;
    let mut connected = false;
    while let Ok(ev) = events.try_recv() {
        match ev {
            ManagerEvent::PeerJoined { .. } => joined += 1,
            ManagerEvent::PeerConnected { .. } => connected = true,
            _ => {}
        }
    }
    assert_eq!(joined, 1);
    assert!(connected);
}
