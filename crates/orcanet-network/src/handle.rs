//! Cloneable handle to a running [`OrcaNode`](crate::node::OrcaNode).
//!
//! Every method sends a [`NetworkCommand`] to the swarm event loop and awaits
//! its oneshot reply.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use libp2p::kad::RecordKey;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::discovery::ConnectedPeers;
use crate::error::NetworkError;
use crate::events::NetworkEvent;
use crate::node::NetworkCommand;
use crate::relay::RelayTarget;
use crate::transfer::TransferService;

/// How long to wait for a relayed connection before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct NetworkHandle {
    local_peer_id: PeerId,
    commands: mpsc::Sender<NetworkCommand>,
    events: broadcast::Sender<NetworkEvent>,
    connected: ConnectedPeers,
    transfer: TransferService,
    relay: Option<RelayTarget>,
    reservation_timeout: Duration,
}

impl NetworkHandle {
    pub(crate) fn new(
        local_peer_id: PeerId,
        commands: mpsc::Sender<NetworkCommand>,
        events: broadcast::Sender<NetworkEvent>,
        connected: ConnectedPeers,
        transfer: TransferService,
        relay: Option<RelayTarget>,
        reservation_timeout: Duration,
    ) -> Self {
        Self {
            local_peer_id,
            commands,
            events,
            connected,
            transfer,
            relay,
            reservation_timeout,
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn relay(&self) -> Option<&RelayTarget> {
        self.relay.as_ref()
    }

    /// Every peer ever connected, in first-seen order.
    pub fn connected_peers(&self) -> &ConnectedPeers {
        &self.connected
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    pub fn transfer(&self) -> &TransferService {
        &self.transfer
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, NetworkError>>) -> NetworkCommand,
    ) -> Result<T, NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| NetworkError::ShutDown)?;
        rx.await.map_err(|_| NetworkError::ShutDown)?
    }

    /// Store a record in the DHT with quorum one.
    pub async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<(), NetworkError> {
        let key = RecordKey::new(&key);
        self.call(|reply| NetworkCommand::PutRecord { key, value, reply })
            .await
    }

    /// Every value found for `key`, the local one first.
    pub async fn get_record(&self, key: &str) -> Result<Vec<Vec<u8>>, NetworkError> {
        let record_key = RecordKey::new(&key);
        let label = key.to_string();
        self.call(|reply| NetworkCommand::GetRecord {
            key: record_key,
            label,
            reply,
        })
        .await
    }

    pub async fn start_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        let key = RecordKey::from(key);
        self.call(|reply| NetworkCommand::StartProviding { key, reply })
            .await
    }

    pub async fn stop_providing(&self, key: Vec<u8>) -> Result<(), NetworkError> {
        let key = RecordKey::from(key);
        self.call(|reply| NetworkCommand::StopProviding { key, reply })
            .await
    }

    pub async fn get_providers(&self, key: Vec<u8>) -> Result<HashSet<PeerId>, NetworkError> {
        let key = RecordKey::from(key);
        self.call(|reply| NetworkCommand::GetProviders { key, reply })
            .await
    }

    /// Dial a peer. Returns false when it is already connected.
    pub async fn dial(&self, peer_id: PeerId, addr: Option<Multiaddr>) -> Result<bool, NetworkError> {
        self.call(|reply| NetworkCommand::Dial {
            peer_id,
            addr,
            reply,
        })
        .await
    }

    /// Make sure a connection to `peer_id` exists, going through the relay
    /// circuit when one is configured.
    pub async fn connect(&self, peer_id: PeerId) -> Result<(), NetworkError> {
        let Some(relay) = &self.relay else {
            // libp2p-stream dials by peer id on first use.
            return Ok(());
        };
        let mut events = self.subscribe();
        if !self.dial(peer_id, Some(relay.circuit_addr(peer_id))).await? {
            return Ok(());
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(NetworkEvent::PeerConnected(c)) if c.peer_id == peer_id => return Ok(()),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(NetworkError::ShutDown),
                }
            }
        };
        tokio::time::timeout(CONNECT_TIMEOUT, wait)
            .await
            .map_err(|_| NetworkError::Dial(format!("no relayed connection to {}", peer_id)))?
    }

    pub async fn add_address(&self, peer_id: PeerId, addr: Multiaddr) -> Result<(), NetworkError> {
        self.call(|reply| NetworkCommand::AddAddress {
            peer_id,
            addr,
            reply,
        })
        .await
    }

    /// Reserve a slot on the configured relay, replacing any previous one.
    pub async fn make_reservation(&self) -> Result<(), NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(NetworkCommand::MakeReservation { reply: tx })
            .await
            .map_err(|_| NetworkError::ShutDown)?;
        match tokio::time::timeout(self.reservation_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetworkError::ShutDown),
            Err(_) => Err(NetworkError::Reservation(format!(
                "relay did not accept within {}s",
                self.reservation_timeout.as_secs()
            ))),
        }
    }

    pub async fn listen_addrs(&self) -> Result<Vec<Multiaddr>, NetworkError> {
        self.call(|reply| NetworkCommand::ListenAddrs { reply }).await
    }

    /// Peers with an open connection right now.
    pub async fn active_peers(&self) -> Result<Vec<PeerId>, NetworkError> {
        self.call(|reply| NetworkCommand::ActivePeers { reply }).await
    }

    pub async fn send_data_to_peer(&self, peer_id: PeerId, data: Vec<u8>) -> Result<(), NetworkError> {
        self.connect(peer_id).await?;
        self.transfer.send_data_to_peer(peer_id, data).await
    }

    pub async fn send_file(&self, peer_id: PeerId, path: &Path) -> Result<(), NetworkError> {
        self.connect(peer_id).await?;
        self.transfer.send_file(peer_id, path).await
    }

    pub async fn check_exists(&self, peer_id: PeerId, hash: &str) -> Result<bool, NetworkError> {
        self.connect(peer_id).await?;
        self.transfer.check_exists(peer_id, hash).await
    }

    pub async fn fetch_name(&self, peer_id: PeerId, hash: &str) -> Result<Option<String>, NetworkError> {
        self.connect(peer_id).await?;
        self.transfer.fetch_name(peer_id, hash).await
    }

    pub async fn fetch_file(&self, peer_id: PeerId, hash: &str) -> Result<Bytes, NetworkError> {
        self.connect(peer_id).await?;
        self.transfer.fetch_file(peer_id, hash).await
    }
}
