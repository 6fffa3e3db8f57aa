//! The DHT operations the coordinator depends on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use libp2p::PeerId;

use crate::discovery::ConnectedPeers;
use crate::error::NetworkError;
use crate::handle::NetworkHandle;

/// Raw Kademlia access: records by string key, providers by key bytes.
#[async_trait]
pub trait Dht: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// Every peer this node has ever been connected to.
    fn known_peers(&self) -> Vec<PeerId>;

    async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<(), NetworkError>;

    /// All values found for `key`, local first. `NotFound` when there are none.
    async fn get_record(&self, key: &str) -> Result<Vec<Vec<u8>>, NetworkError>;

    async fn start_providing(&self, key: Vec<u8>) -> Result<(), NetworkError>;

    async fn stop_providing(&self, key: Vec<u8>) -> Result<(), NetworkError>;

    async fn get_providers(&self, key: Vec<u8>) -> Result<HashSet<PeerId>, NetworkError>;
}

#[async_trait]
impl Dht for NetworkHandle {
    fn local_peer_id(&self) -> PeerId {
        NetworkHandle::local_peer_id(self)
    }

    fn known_peers(&self) -> Vec<PeerId> {
        self.connected_peers().snapshot()
    }

    async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<(), NetworkError> {
        NetworkHandle::put_record(self, key, value).await
    }

    async fn get_record(&self, key: &str) -> Result<Vec<Vec<u8>>, NetworkError> {
        NetworkHandle::get_record(self, key).await
    }

    async fn start_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        NetworkHandle::start_providing(self, key).await
    }

    async fn stop_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        NetworkHandle::stop_providing(self, key).await
    }

    async fn get_providers(&self, key: Vec<u8>) -> Result<HashSet<PeerId>, NetworkError> {
        NetworkHandle::get_providers(self, key).await
    }
}

#[derive(Default)]
struct MemoryDhtState {
    records: DashMap<String, Vec<u8>>,
    providers: DashMap<Vec<u8>, HashSet<PeerId>>,
    reject_puts: AtomicBool,
}

/// An in-process DHT. Every node created with [`MemoryDht::join`] sees the
/// same records and providers; used by tests and by tools that run offline.
#[derive(Clone)]
pub struct MemoryDht {
    local: PeerId,
    state: Arc<MemoryDhtState>,
    known: ConnectedPeers,
}

impl MemoryDht {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            state: Arc::new(MemoryDhtState::default()),
            known: ConnectedPeers::new(),
        }
    }

    /// Another node on the same in-process network.
    pub fn join(&self, local: PeerId) -> Self {
        Self {
            local,
            state: self.state.clone(),
            known: ConnectedPeers::new(),
        }
    }

    pub fn add_known_peer(&self, peer: PeerId) {
        self.known.insert(peer);
    }

    /// Raw stored value, bypassing selection.
    pub fn raw_record(&self, key: &str) -> Option<Vec<u8>> {
        self.state.records.get(key).map(|v| v.clone())
    }

    /// Register `peer` as a provider directly.
    pub fn insert_provider(&self, key: Vec<u8>, peer: PeerId) {
        self.state.providers.entry(key).or_default().insert(peer);
    }

    pub fn provider_key_count(&self) -> usize {
        self.state.providers.len()
    }

    /// Make every following `put_record` fail, as a put without quorum would.
    pub fn reject_puts(&self, reject: bool) {
        self.state.reject_puts.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Dht for MemoryDht {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn known_peers(&self) -> Vec<PeerId> {
        self.known.snapshot()
    }

    async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<(), NetworkError> {
        if self.state.reject_puts.load(Ordering::SeqCst) {
            return Err(NetworkError::Kademlia(format!("put {} failed: quorum failed", key)));
        }
        self.state.records.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_record(&self, key: &str) -> Result<Vec<Vec<u8>>, NetworkError> {
        self.raw_record(key)
            .map(|v| vec![v])
            .ok_or_else(|| NetworkError::NotFound(key.to_string()))
    }

    async fn start_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        self.insert_provider(key, self.local);
        Ok(())
    }

    async fn stop_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        if let Some(mut set) = self.state.providers.get_mut(&key) {
            set.remove(&self.local);
        }
        Ok(())
    }

    async fn get_providers(&self, key: Vec<u8>) -> Result<HashSet<PeerId>, NetworkError> {
        Ok(self
            .state
            .providers
            .get(&key)
            .map(|set| set.clone())
            .unwrap_or_default())
    }
}
