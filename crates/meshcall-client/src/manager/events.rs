use meshcall_core::protocol::Location;

use crate::engine::PeerState;
use crate::role::Role;

/// Notifications for the application shell.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent<S> {
    /// A context was created (or recreated by a flip) for a peer.
    PeerJoined { peer_id: String, role: Role },
    PeerStateChanged { peer_id: String, state: PeerState },
    PeerConnected { peer_id: String },
    /// The context is gone; drop any UI for this peer.
    PeerClosed { peer_id: String },
    StreamAvailable { peer_id: String, stream: S },
    LocationReceived { peer_id: String, location: Location },
}

/// Requests from the application shell into a running manager.
#[derive(Debug)]
pub enum Command<S> {
    /// Hand a new local stream to every live engine and remember it for
    /// future ones.
    RefreshLocalStream(S),
    Shutdown,
}
