//! OrcaNet P2P Networking Crate
//!
//! The peer-to-peer layer of an OrcaNet node, built on libp2p:
//!
//! - **Kademlia** for the `/orcanet/...` key/value records and the provider index
//! - **Circuit relay v2** with hole punching (DCUtR), AutoNAT and UPnP
//! - **Peer exchange** over `/orcanet/p2p`, gossiping known peers on connect
//! - **Direct transfer** over `/senddata/p2p`, a tagged, length-prefixed
//!   request/reply protocol for file lookups and downloads
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use orcanet_core::MemoryMetadataStore;
//! use orcanet_network::{NamespacedValidator, NodeConfig, OrcaNode};
//! use libp2p::identity::Keypair;
//! use tokio::task::JoinSet;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let keypair = Keypair::generate_ed25519();
//!     let mut node = OrcaNode::new(
//!         keypair,
//!         NodeConfig::default(),
//!         Arc::new(MemoryMetadataStore::new()),
//!         Arc::new(NamespacedValidator::orcanet()),
//!     )
//!     .unwrap();
//!     node.start().await.unwrap();
//!
//!     let mut tasks = JoinSet::new();
//!     let handle = node.spawn(&mut tasks, CancellationToken::new()).unwrap();
//!     println!("running as {}", handle.local_peer_id());
//! }
//! ```

pub mod behaviour;
pub mod coordinator;
pub mod dht;
pub mod discovery;
pub mod error;
pub mod events;
pub mod exchange;
pub mod handle;
pub mod node;
pub mod protocol;
pub mod relay;
pub mod transfer;
pub mod transport;
pub mod validator;

// Re-exports for convenience.
pub use behaviour::{DhtMode, OrcaBehaviour, OrcaBehaviourEvent};
pub use coordinator::{Coordinator, ProxyRegistration, ReplaySummary};
pub use dht::{Dht, MemoryDht};
pub use discovery::{ConnectedPeers, PeerDiscovery};
pub use error::NetworkError;
pub use events::{DataReceived, NetworkEvent, PeerConnected, PeerDisconnected, PeersExchanged};
pub use handle::NetworkHandle;
pub use node::{NetworkCommand, NodeConfig, OrcaNode};
pub use protocol::{Frame, FrameKind, EXCHANGE_PROTOCOL, TRANSFER_PROTOCOL};
pub use relay::{refresh_reservation, RelayTarget};
pub use transfer::{PendingReplies, TransferService};
pub use validator::{NamespacedValidator, PermissiveValidator, RecordValidator};

// Re-export commonly used libp2p types for downstream convenience.
pub use libp2p::{identity::Keypair, Multiaddr, PeerId};
