//! Process context shared by the HTTP handlers and background tasks.

use libp2p::PeerId;
use orcanet_core::MetadataStore;
use orcanet_network::{Coordinator, NetworkHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::OrcaConfig;
use crate::payment::PaymentClient;

/// Everything a request handler needs, built once at startup.
pub struct NodeState {
    /// The local peer ID of this node.
    pub peer_id: PeerId,
    /// When the node started.
    pub start_time: Instant,
    pub config: OrcaConfig,
    /// Swarm access: dials, transfers, connected peers.
    pub network: NetworkHandle,
    /// DHT records and provider advertisements.
    pub coordinator: Coordinator,
    /// Files this node hosts.
    pub store: Arc<dyn MetadataStore>,
    pub payments: PaymentClient,
}

impl NodeState {
    pub fn new(
        config: OrcaConfig,
        network: NetworkHandle,
        coordinator: Coordinator,
        store: Arc<dyn MetadataStore>,
        payments: PaymentClient,
    ) -> Self {
        Self {
            peer_id: network.local_peer_id(),
            start_time: Instant::now(),
            config,
            network,
            coordinator,
            store,
            payments,
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.config.transfer.files_dir
    }

    /// Every peer this node has ever been connected to.
    pub fn known_peers(&self) -> Vec<PeerId> {
        self.network.connected_peers().snapshot()
    }

    pub fn peer_count(&self) -> usize {
        self.network.connected_peers().len()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
