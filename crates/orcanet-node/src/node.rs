//! The full OrcaNet node orchestrator.
//!
//! Ties together storage, the P2P network, the relay reservation and the HTTP
//! API. Every background task lives in one `JoinSet` and watches one
//! cancellation token; [`OrcaFullNode::shutdown`] cancels and drains them.

use anyhow::{Context, Result};
use libp2p::identity::Keypair;
use libp2p::PeerId;
use orcanet_core::MetadataStore;
use orcanet_network::{
    refresh_reservation, Coordinator, NamespacedValidator, NetworkEvent, NetworkHandle, OrcaNode,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::OrcaConfig;
use crate::payment::PaymentClient;
use crate::state::NodeState;
use crate::storage::Storage;

/// How long shutdown waits for background tasks before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The full OrcaNet node.
pub struct OrcaFullNode {
    config: OrcaConfig,
    keypair: Keypair,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    state: Option<Arc<NodeState>>,
    api_addr: Option<SocketAddr>,
}

impl OrcaFullNode {
    /// Create a node. The identity is derived from the configured seed, or
    /// generated fresh when there is none.
    pub fn new(config: OrcaConfig) -> Result<Self> {
        let keypair = match config.identity.seed.as_deref() {
            Some(seed) => orcanet_crypto::keypair_from_seed(seed)?,
            None => {
                tracing::info!("no seed configured, generating ephemeral keypair");
                Keypair::generate_ed25519()
            }
        };
        tracing::info!(peer_id = %keypair.public().to_peer_id(), "OrcaNet node created");

        Ok(Self {
            config,
            keypair,
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            state: None,
            api_addr: None,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    pub fn state(&self) -> Option<&Arc<NodeState>> {
        self.state.as_ref()
    }

    /// Address the HTTP API is bound to, once started.
    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api_addr
    }

    /// Open storage, start the network, reserve a relay slot, replay uploads
    /// and serve the API. Any failure here aborts startup.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting OrcaNet node");

        let store: Arc<dyn MetadataStore> = Arc::new(
            Storage::open(&self.config.storage.data_dir).context("failed to open storage")?,
        );
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");
        std::fs::create_dir_all(&self.config.transfer.files_dir)?;

        let validator = Arc::new(NamespacedValidator::orcanet());
        let mut network = OrcaNode::new(
            self.keypair.clone(),
            self.config.node_config()?,
            store.clone(),
            validator.clone(),
        )?;
        let addrs = network.start().await?;
        tracing::info!(?addrs, "P2P network started");
        let handle = network.spawn(&mut self.tasks, self.cancel.clone())?;

        if handle.relay().is_some() {
            self.reserve(&handle).await?;
        }

        let coordinator = Coordinator::new(Arc::new(handle.clone()), validator);
        let payments = PaymentClient::new(self.config.wallet.payment_url.clone())?;
        let state = Arc::new(NodeState::new(
            self.config.clone(),
            handle.clone(),
            coordinator,
            store,
            payments,
        ));

        // Re-publish what we host so the DHT reflects the local store.
        let replay = state.clone();
        self.tasks.spawn(async move {
            if let Err(e) = replay
                .coordinator
                .provide_all_uploads(replay.store.as_ref())
                .await
            {
                tracing::warn!(error = %e, "could not read local uploads");
            }
        });

        let listener = tokio::net::TcpListener::bind(self.config.api_addr())
            .await
            .with_context(|| format!("failed to bind API on {}", self.config.api_addr()))?;
        self.api_addr = Some(listener.local_addr()?);
        let api_state = state.clone();
        let api_cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            if let Err(e) = crate::api::serve(listener, api_state, api_cancel).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        self.state = Some(state);
        Ok(())
    }

    /// Initial reservation plus the refresh task.
    async fn reserve(&mut self, handle: &NetworkHandle) -> Result<()> {
        match handle.make_reservation().await {
            Ok(()) => tracing::info!("relay reservation accepted"),
            Err(e) if self.config.network.require_reservation => {
                return Err(e).context("initial relay reservation failed");
            }
            Err(e) => tracing::warn!(error = %e, "relay reservation failed, continuing without"),
        }
        self.tasks.spawn(refresh_reservation(
            handle.clone(),
            self.config.reservation_refresh(),
            self.cancel.clone(),
        ));
        Ok(())
    }

    /// Log network events until cancelled or the network goes away.
    pub async fn run(&self) -> Result<()> {
        let state = self
            .state
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let mut events = state.network.subscribe();

        tracing::info!("entering main event loop");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(ev) => Self::handle_network_event(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("network event channel closed");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    fn handle_network_event(event: &NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected(pc) => {
                tracing::info!(peer_id = %pc.peer_id, first_seen = pc.first_seen, known = pc.num_known, "peer connected");
            }
            NetworkEvent::PeerDisconnected(pd) => {
                tracing::info!(peer_id = %pd.peer_id, "peer disconnected");
            }
            NetworkEvent::Listening { address } => {
                tracing::info!(%address, "listening on address");
            }
            NetworkEvent::ReservationAccepted {
                relay_peer_id,
                renewal,
            } => {
                tracing::info!(%relay_peer_id, renewal, "relay reservation active");
            }
            NetworkEvent::PeersExchanged(px) => {
                tracing::debug!(from = %px.from, learned = px.peers.len(), "peer exchange received");
            }
            NetworkEvent::DataReceived(dr) => {
                tracing::info!(
                    peer_id = %dr.peer_id,
                    bytes = dr.data.len(),
                    data = %String::from_utf8_lossy(&dr.data),
                    "data received"
                );
            }
        }
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down OrcaNet node");
        self.cancel.cancel();

        let drain = async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        tracing::error!(error = %e, "background task panicked");
                    }
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("background tasks did not stop in time, aborting");
            self.tasks.abort_all();
        }

        self.state = None;
        tracing::info!("OrcaNet node shut down");
        Ok(())
    }
}
