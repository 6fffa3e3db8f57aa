//! Peer bookkeeping for an OrcaNet node.
//!
//! - **Bootstrap**: configured `/.../p2p/<id>` addresses seeded into Kademlia.
//! - **ConnectedPeers**: every peer a connection was ever established with,
//!   plus the subset that is connected right now.

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::NetworkError;

/// Split a `/.../p2p/<id>` multiaddr into its peer id and transport address.
pub fn split_peer_addr(addr: &Multiaddr) -> Option<(PeerId, Multiaddr)> {
    let mut transport = addr.clone();
    match transport.pop()? {
        Protocol::P2p(peer_id) => Some((peer_id, transport)),
        _ => None,
    }
}

/// Parsed bootstrap peers.
#[derive(Debug)]
pub struct PeerDiscovery {
    bootstrap: Vec<(PeerId, Multiaddr)>,
}

impl PeerDiscovery {
    /// Parse bootstrap addresses; each must end in `/p2p/<peer id>`.
    pub fn new(bootstrap_addrs: &[String]) -> Result<Self, NetworkError> {
        let mut bootstrap = Vec::with_capacity(bootstrap_addrs.len());
        for addr_str in bootstrap_addrs {
            let addr = Multiaddr::from_str(addr_str).map_err(|e| {
                NetworkError::Transport(format!("invalid bootstrap addr '{}': {}", addr_str, e))
            })?;
            let entry = split_peer_addr(&addr).ok_or_else(|| {
                NetworkError::Transport(format!(
                    "bootstrap addr '{}' has no /p2p/<peer id> suffix",
                    addr_str
                ))
            })?;
            bootstrap.push(entry);
        }

        Ok(Self { bootstrap })
    }

    pub fn bootstrap_peers(&self) -> &[(PeerId, Multiaddr)] {
        &self.bootstrap
    }

    pub fn has_bootstrap_peers(&self) -> bool {
        !self.bootstrap.is_empty()
    }

    pub fn is_bootstrap_peer(&self, peer_id: &PeerId) -> bool {
        self.bootstrap.iter().any(|(id, _)| id == peer_id)
    }
}

#[derive(Debug, Default)]
struct PeerBook {
    seen: Vec<PeerId>,
    live: HashSet<PeerId>,
}

/// Every peer this node has been connected to, and which of them still are.
///
/// The seen list only grows. Shared between the swarm loop (writer) and the
/// peer exchange, proxy listing and status endpoints (readers).
#[derive(Debug, Clone, Default)]
pub struct ConnectedPeers {
    inner: Arc<RwLock<PeerBook>>,
}

impl ConnectedPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live peer. Returns true the first time it is seen.
    pub fn insert(&self, peer_id: PeerId) -> bool {
        let mut book = self.inner.write().unwrap_or_else(|e| e.into_inner());
        book.live.insert(peer_id);
        if book.seen.contains(&peer_id) {
            return false;
        }
        book.seen.push(peer_id);
        true
    }

    /// The last connection to `peer_id` closed. It stays in the seen list.
    pub fn disconnected(&self, peer_id: &PeerId) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .live
            .remove(peer_id);
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .seen
            .contains(peer_id)
    }

    /// Peers in the order they were first seen.
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).seen.clone()
    }

    /// Currently connected peers, in the order they were first seen.
    pub fn active(&self) -> Vec<PeerId> {
        let book = self.inner.read().unwrap_or_else(|e| e.into_inner());
        book.seen
            .iter()
            .filter(|p| book.live.contains(p))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
