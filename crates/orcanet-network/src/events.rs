//! Network event types for the OrcaNet P2P layer.
//!
//! Emitted on a broadcast channel so the node, the HTTP API and tests can
//! observe network activity without touching the swarm.

use libp2p::{Multiaddr, PeerId};

/// High-level events emitted by the OrcaNet network layer.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A connection to a peer was established.
    PeerConnected(PeerConnected),

    /// The last connection to a peer closed.
    PeerDisconnected(PeerDisconnected),

    /// This node started listening on an address.
    Listening {
        /// The address we are now listening on.
        address: Multiaddr,
    },

    /// The relay accepted (or renewed) our reservation.
    ReservationAccepted {
        relay_peer_id: PeerId,
        renewal: bool,
    },

    /// A peer told us which peers it knows.
    PeersExchanged(PeersExchanged),

    /// An unsolicited payload arrived on the transfer protocol.
    DataReceived(DataReceived),
}

/// Emitted when a connection is established.
#[derive(Debug, Clone)]
pub struct PeerConnected {
    pub peer_id: PeerId,
    /// True for the first connection ever seen to this peer.
    pub first_seen: bool,
    /// Number of peers ever connected.
    pub num_known: usize,
}

/// Emitted when the last connection to a peer closes.
#[derive(Debug, Clone)]
pub struct PeerDisconnected {
    pub peer_id: PeerId,
}

/// Result of one inbound peer exchange.
#[derive(Debug, Clone)]
pub struct PeersExchanged {
    /// The peer that sent the list.
    pub from: PeerId,
    /// Peers we decided to connect to.
    pub peers: Vec<PeerId>,
}

/// Raw bytes pushed to us by a peer.
#[derive(Debug, Clone)]
pub struct DataReceived {
    pub peer_id: PeerId,
    pub data: Vec<u8>,
}
