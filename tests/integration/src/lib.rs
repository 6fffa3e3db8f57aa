//! Helpers for running several OrcaNet nodes in one process over loopback.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use libp2p::{Multiaddr, PeerId};
use orcanet_core::{FileRecord, MemoryMetadataStore, MetadataStore};
use orcanet_network::{
    DhtMode, Keypair, NamespacedValidator, NetworkEvent, NetworkHandle, NodeConfig, OrcaNode,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A running node plus everything needed to inspect and stop it.
pub struct TestNode {
    pub handle: NetworkHandle,
    pub peer_id: PeerId,
    pub addr: Multiaddr,
    pub store: Arc<MemoryMetadataStore>,
    pub files_dir: PathBuf,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl TestNode {
    /// Start a client-mode node on 127.0.0.1 with an empty store.
    pub async fn spawn() -> Self {
        Self::spawn_with(DhtMode::Client, Vec::new()).await
    }

    pub async fn spawn_with(dht_mode: DhtMode, bootstrap_peers: Vec<String>) -> Self {
        Self::spawn_config(NodeConfig {
            bootstrap_peers,
            dht_mode,
            ..NodeConfig::default()
        })
        .await
    }

    /// Start a node that uses `relay` and holds a reservation on it.
    pub async fn spawn_relayed(relay: &TestNode) -> Self {
        let node = Self::spawn_config(NodeConfig {
            relay_addr: Some(relay.full_addr()),
            ..NodeConfig::default()
        })
        .await;
        node.handle.make_reservation().await.expect("relay reservation");
        node
    }

    /// Start a node from `config`, overriding its listen address and files
    /// directory.
    pub async fn spawn_config(config: NodeConfig) -> Self {
        let files_dir =
            std::env::temp_dir().join(format!("orcanet-it-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&files_dir).expect("create files dir");

        let store = Arc::new(MemoryMetadataStore::new());
        let config = NodeConfig {
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".into()],
            query_timeout: Duration::from_secs(10),
            files_dir: files_dir.clone(),
            ..config
        };
        let mut node = OrcaNode::new(
            Keypair::generate_ed25519(),
            config,
            store.clone() as Arc<dyn MetadataStore>,
            Arc::new(NamespacedValidator::orcanet()),
        )
        .expect("node config");
        let addrs = node.start().await.expect("node start");
        let addr = addrs.into_iter().next().expect("a listen address");

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let handle = node.spawn(&mut tasks, cancel.clone()).expect("spawn node");
        let peer_id = handle.local_peer_id();

        Self {
            handle,
            peer_id,
            addr,
            store,
            files_dir,
            cancel,
            tasks,
        }
    }

    /// `/ip4/.../tcp/.../p2p/<id>`, the form bootstrap lists take.
    pub fn full_addr(&self) -> String {
        format!("{}/p2p/{}", self.addr, self.peer_id)
    }

    /// Host `data` under `filename` and record it in the metadata store.
    pub fn host_file(&self, filename: &str, data: &[u8], cost: f64) -> String {
        let hash = orcanet_crypto::sha256_hex(data);
        std::fs::write(self.files_dir.join(filename), data).expect("write hosted file");
        self.store
            .store_file_record(FileRecord::new(hash.clone(), filename, cost))
            .expect("store record");
        hash
    }

    /// Dial `other` directly and wait until the connection is up.
    pub async fn connect_to(&self, other: &TestNode) {
        let mut events = self.handle.subscribe();
        self.handle
            .add_address(other.peer_id, other.addr.clone())
            .await
            .expect("add address");
        if !self
            .handle
            .dial(other.peer_id, Some(other.addr.clone()))
            .await
            .expect("dial")
        {
            return;
        }
        wait_for(&mut events, |e| {
            matches!(e, NetworkEvent::PeerConnected(c) if c.peer_id == other.peer_id)
        })
        .await;
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        remove_dir(&self.files_dir);
    }
}

fn remove_dir(dir: &Path) {
    std::fs::remove_dir_all(dir).ok();
}

/// Wait (up to 15s) for an event matching `pred` and return it.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<NetworkEvent>, pred: F) -> NetworkEvent
where
    F: Fn(&NetworkEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(15), wait)
        .await
        .expect("timed out waiting for network event")
}

/// Retry `op` every 250ms until it succeeds or 15s pass. Kademlia needs a
/// moment after connecting before routing tables are populated.
pub async fn eventually<T, E, F, Fut>(mut op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        match op().await {
            Ok(value) => return value,
            Err(e) if tokio::time::Instant::now() >= deadline => {
                panic!("operation never succeeded: {:?}", e)
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
        }
    }
}
