//! The composed libp2p behaviour of an OrcaNet node.

use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::kad::store::MemoryStore;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{autonat, dcutr, identify, kad, ping, relay, upnp};

use crate::protocol::IDENTIFY_PROTOCOL_VERSION;

/// Whether Kademlia answers queries from other peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DhtMode {
    /// Query the DHT but never serve it. Suited to NAT-ed nodes.
    #[default]
    Client,
    /// Serve records and provider lookups to other peers.
    Server,
}

impl std::str::FromStr for DhtMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(DhtMode::Client),
            "server" => Ok(DhtMode::Server),
            other => Err(format!("unknown DHT mode '{}', expected client or server", other)),
        }
    }
}

impl From<DhtMode> for kad::Mode {
    fn from(mode: DhtMode) -> Self {
        match mode {
            DhtMode::Client => kad::Mode::Client,
            DhtMode::Server => kad::Mode::Server,
        }
    }
}

/// Transport, relay and DHT services of an OrcaNet node.
#[derive(NetworkBehaviour)]
pub struct OrcaBehaviour {
    pub relay_client: relay::client::Behaviour,
    pub relay_server: relay::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub autonat: autonat::Behaviour,
    pub upnp: upnp::tokio::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub stream: libp2p_stream::Behaviour,
}

impl OrcaBehaviour {
    /// Build the behaviour. Inbound records are filtered so the node can run
    /// them through its validator before storing.
    pub fn new(
        key: &Keypair,
        relay_client: relay::client::Behaviour,
        mode: DhtMode,
        query_timeout: Duration,
    ) -> Self {
        let peer_id = key.public().to_peer_id();

        let mut kad_config = kad::Config::new(kad::PROTOCOL_NAME);
        kad_config.set_query_timeout(query_timeout);
        kad_config.set_record_filtering(kad::StoreInserts::FilterBoth);
        let mut kademlia =
            kad::Behaviour::with_config(peer_id, MemoryStore::new(peer_id), kad_config);
        kademlia.set_mode(Some(mode.into()));

        Self {
            relay_client,
            relay_server: relay::Behaviour::new(peer_id, relay::Config::default()),
            dcutr: dcutr::Behaviour::new(peer_id),
            autonat: autonat::Behaviour::new(peer_id, autonat::Config::default()),
            upnp: upnp::tokio::Behaviour::default(),
            identify: identify::Behaviour::new(identify::Config::new(
                IDENTIFY_PROTOCOL_VERSION.to_string(),
                key.public(),
            )),
            ping: ping::Behaviour::new(ping::Config::new()),
            kademlia,
            stream: libp2p_stream::Behaviour::new(),
        }
    }
}
