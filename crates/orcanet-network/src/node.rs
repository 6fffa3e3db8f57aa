//! The OrcaNet network node.
//!
//! `OrcaNode` owns the libp2p `Swarm`. After [`OrcaNode::start`] it is moved
//! into its own task by [`OrcaNode::spawn`]; everything else reaches it
//! through a [`NetworkHandle`] that sends [`NetworkCommand`]s over a channel.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::core::transport::ListenerId;
use libp2p::identity::Keypair;
use libp2p::kad::store::RecordStore;
use libp2p::kad::{self, GetProvidersOk, GetRecordOk, QueryId, QueryResult, RecordKey};
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::SwarmEvent;
use libp2p::{autonat, identify, relay, upnp, Multiaddr, PeerId, Swarm};
use libp2p_stream::IncomingStreams;
use orcanet_core::MetadataStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::behaviour::{DhtMode, OrcaBehaviour, OrcaBehaviourEvent};
use crate::discovery::{ConnectedPeers, PeerDiscovery};
use crate::error::NetworkError;
use crate::events::{NetworkEvent, PeerConnected, PeerDisconnected};
use crate::exchange::PeerExchange;
use crate::handle::NetworkHandle;
use crate::protocol::{EXCHANGE_PROTOCOL, TRANSFER_PROTOCOL};
use crate::relay::{RelayTarget, DEFAULT_RESERVATION_TIMEOUT};
use crate::transfer::{TransferService, DEFAULT_REPLY_TIMEOUT};
use crate::transport::{self, TransportConfig};
use crate::validator::{key_str, RecordValidator};

/// Configuration for the OrcaNode.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Addresses to listen on, e.g. "/ip4/0.0.0.0/tcp/60000".
    pub listen_addrs: Vec<String>,
    /// Bootstrap peers as `/.../p2p/<id>` multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Relay node as a `/.../p2p/<id>` multiaddress.
    pub relay_addr: Option<String>,
    pub dht_mode: DhtMode,
    /// Upper bound on every Kademlia query.
    pub query_timeout: Duration,
    pub reservation_timeout: Duration,
    pub reply_timeout: Duration,
    /// Directory hosted files are served from.
    pub files_dir: PathBuf,
    /// Broadcast channel capacity for network events.
    pub event_channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/60000".into()],
            bootstrap_peers: Vec::new(),
            relay_addr: None,
            dht_mode: DhtMode::Client,
            query_timeout: Duration::from_secs(60),
            reservation_timeout: DEFAULT_RESERVATION_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            files_dir: PathBuf::from("files"),
            event_channel_capacity: 256,
        }
    }
}

/// Commands that can be sent to the network event loop from external tasks.
pub enum NetworkCommand {
    PutRecord {
        key: RecordKey,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    GetRecord {
        key: RecordKey,
        /// Printable key, for errors.
        label: String,
        reply: oneshot::Sender<Result<Vec<Vec<u8>>, NetworkError>>,
    },
    StartProviding {
        key: RecordKey,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    StopProviding {
        key: RecordKey,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    GetProviders {
        key: RecordKey,
        reply: oneshot::Sender<Result<HashSet<PeerId>, NetworkError>>,
    },
    /// Dial unless already connected. Replies false when connected.
    Dial {
        peer_id: PeerId,
        addr: Option<Multiaddr>,
        reply: oneshot::Sender<Result<bool, NetworkError>>,
    },
    AddAddress {
        peer_id: PeerId,
        addr: Multiaddr,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    /// Listen on the relay circuit and reply once the relay accepts.
    MakeReservation {
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    ListenAddrs {
        reply: oneshot::Sender<Result<Vec<Multiaddr>, NetworkError>>,
    },
    ActivePeers {
        reply: oneshot::Sender<Result<Vec<PeerId>, NetworkError>>,
    },
}

/// An in-flight Kademlia query a caller is waiting on.
enum PendingQuery {
    GetRecord {
        label: String,
        values: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<Vec<Vec<u8>>, NetworkError>>,
    },
    PutRecord {
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    StartProviding {
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    GetProviders {
        providers: HashSet<PeerId>,
        reply: oneshot::Sender<Result<HashSet<PeerId>, NetworkError>>,
    },
}

struct PendingReservation {
    listener: ListenerId,
    reply: oneshot::Sender<Result<(), NetworkError>>,
}

/// Services created at start and handed to their own tasks by `spawn`.
struct Services {
    exchange: PeerExchange,
    transfer: TransferService,
    exchange_incoming: IncomingStreams,
    transfer_incoming: IncomingStreams,
}

/// The OrcaNet P2P network node.
pub struct OrcaNode {
    keypair: Keypair,
    local_peer_id: PeerId,
    config: NodeConfig,
    discovery: PeerDiscovery,
    relay: Option<RelayTarget>,
    store: Arc<dyn MetadataStore>,
    validator: Arc<dyn RecordValidator>,
    swarm: Option<Swarm<OrcaBehaviour>>,
    services: Option<Services>,
    event_tx: broadcast::Sender<NetworkEvent>,
    command_tx: mpsc::Sender<NetworkCommand>,
    command_rx: Option<mpsc::Receiver<NetworkCommand>>,
    connected: ConnectedPeers,
    /// Peers that connected before the event loop ran.
    startup_announcements: Vec<PeerId>,
    queries: HashMap<QueryId, PendingQuery>,
    reservation: Option<PendingReservation>,
    relay_listener: Option<ListenerId>,
}

impl OrcaNode {
    /// Create a new node. Addresses are parsed here so that bad configuration
    /// fails before anything touches the network.
    pub fn new(
        keypair: Keypair,
        config: NodeConfig,
        store: Arc<dyn MetadataStore>,
        validator: Arc<dyn RecordValidator>,
    ) -> Result<Self, NetworkError> {
        let local_peer_id = keypair.public().to_peer_id();
        let discovery = PeerDiscovery::new(&config.bootstrap_peers)?;
        let relay = config
            .relay_addr
            .as_deref()
            .map(RelayTarget::parse)
            .transpose()?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(256);

        tracing::info!(%local_peer_id, relay = ?relay.as_ref().map(|r| r.peer_id), "creating OrcaNet node");

        Ok(Self {
            keypair,
            local_peer_id,
            config,
            discovery,
            relay,
            store,
            validator,
            swarm: None,
            services: None,
            event_tx,
            command_tx,
            command_rx: Some(command_rx),
            connected: ConnectedPeers::new(),
            startup_announcements: Vec::new(),
            queries: HashMap::new(),
            reservation: None,
            relay_listener: None,
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    pub fn event_receiver(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }

    pub fn connected_peers(&self) -> &ConnectedPeers {
        &self.connected
    }

    pub fn is_running(&self) -> bool {
        self.swarm.is_some()
    }

    /// Build the swarm, register the stream protocols, listen and bootstrap.
    ///
    /// Returns the addresses actually bound (useful when port is 0).
    pub async fn start(&mut self) -> Result<Vec<Multiaddr>, NetworkError> {
        if self.swarm.is_some() {
            return Err(NetworkError::AlreadyRunning);
        }

        tracing::info!(
            listen_addrs = ?self.config.listen_addrs,
            peer_id = %self.local_peer_id,
            dht_mode = ?self.config.dht_mode,
            "starting OrcaNet node"
        );

        let mut swarm = transport::build_swarm(
            self.keypair.clone(),
            &TransportConfig {
                dht_mode: self.config.dht_mode,
                query_timeout: self.config.query_timeout,
                ..TransportConfig::default()
            },
        )?;

        let mut control = swarm.behaviour().stream.new_control();
        let exchange_incoming = control
            .accept(EXCHANGE_PROTOCOL)
            .map_err(|e| NetworkError::Stream(e.to_string()))?;
        let transfer_incoming = control
            .accept(TRANSFER_PROTOCOL)
            .map_err(|e| NetworkError::Stream(e.to_string()))?;

        let transfer = TransferService::new(
            control.clone(),
            self.store.clone(),
            self.config.files_dir.clone(),
            self.config.reply_timeout,
            self.event_tx.clone(),
        );
        let exchange = PeerExchange::new(
            control,
            self.local_peer_id,
            self.relay.clone(),
            self.connected.clone(),
            self.command_tx.clone(),
            self.event_tx.clone(),
        );

        let mut pending_listeners = HashSet::new();
        for addr_str in &self.config.listen_addrs {
            let addr = Multiaddr::from_str(addr_str)
                .map_err(|e| NetworkError::Listen(format!("invalid listen address '{}': {}", addr_str, e)))?;
            let id = swarm
                .listen_on(addr)
                .map_err(|e| NetworkError::Listen(e.to_string()))?;
            pending_listeners.insert(id);
        }

        for (peer_id, addr) in self.discovery.bootstrap_peers() {
            tracing::info!(%peer_id, addr = %addr, "adding bootstrap peer");
            swarm
                .behaviour_mut()
                .kademlia
                .add_address(peer_id, addr.clone());
            let opts = DialOpts::peer_id(*peer_id).addresses(vec![addr.clone()]).build();
            if let Err(e) = swarm.dial(opts) {
                tracing::warn!(%peer_id, error = %e, "failed to dial bootstrap peer");
            }
        }

        let bootstrap_query = if self.discovery.has_bootstrap_peers() {
            let id = swarm
                .behaviour_mut()
                .kademlia
                .bootstrap()
                .map_err(|e| NetworkError::Bootstrap(e.to_string()))?;
            Some(id)
        } else {
            None
        };

        self.swarm = Some(swarm);
        self.services = Some(Services {
            exchange,
            transfer,
            exchange_incoming,
            transfer_incoming,
        });

        match self.await_startup(pending_listeners, bootstrap_query).await {
            Ok(bound) => Ok(bound),
            Err(e) => {
                self.swarm = None;
                self.services = None;
                Err(e)
            }
        }
    }

    /// Drive the swarm until every listener reported an address and the
    /// first bootstrap round, if any, finished.
    ///
    /// A bootstrap round in which no peer answered is an error.
    async fn await_startup(
        &mut self,
        mut pending: HashSet<ListenerId>,
        mut bootstrap: Option<QueryId>,
    ) -> Result<Vec<Multiaddr>, NetworkError> {
        let mut bound = Vec::new();
        let listen_deadline = tokio::time::sleep(Duration::from_secs(10));
        let bootstrap_deadline = tokio::time::sleep(self.config.query_timeout + Duration::from_secs(1));
        tokio::pin!(listen_deadline);
        tokio::pin!(bootstrap_deadline);

        while !pending.is_empty() || bootstrap.is_some() {
            let event = {
                let swarm = self.swarm.as_mut().ok_or(NetworkError::NotStarted)?;
                tokio::select! {
                    event = swarm.select_next_some() => event,
                    _ = &mut listen_deadline, if !pending.is_empty() => {
                        return Err(NetworkError::Listen("timed out waiting for listen addresses".into()));
                    }
                    _ = &mut bootstrap_deadline, if bootstrap.is_some() => {
                        return Err(NetworkError::Bootstrap("timed out waiting for bootstrap peers".into()));
                    }
                }
            };
            match event {
                SwarmEvent::NewListenAddr { listener_id, address } => {
                    pending.remove(&listener_id);
                    bound.push(address.clone());
                    self.handle_swarm_event(SwarmEvent::NewListenAddr { listener_id, address });
                }
                SwarmEvent::ListenerClosed { listener_id, reason, .. } if pending.contains(&listener_id) => {
                    return Err(NetworkError::Listen(format!("listener closed: {:?}", reason)));
                }
                SwarmEvent::Behaviour(OrcaBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
                    id,
                    result: QueryResult::Bootstrap(result),
                    stats,
                    ..
                })) if bootstrap == Some(id) => {
                    bootstrap = None;
                    match result {
                        Ok(_) if stats.num_successes() > 0 => {
                            tracing::info!(answered = stats.num_successes(), "bootstrap finished");
                        }
                        Ok(_) => {
                            return Err(NetworkError::Bootstrap("no bootstrap peer answered".into()));
                        }
                        Err(e) => return Err(NetworkError::Bootstrap(e.to_string())),
                    }
                }
                other => {
                    if let Some(peer_id) = self.handle_swarm_event(other) {
                        self.startup_announcements.push(peer_id);
                    }
                }
            }
        }
        Ok(bound)
    }

    /// A handle for talking to the node once it runs.
    pub fn handle(&self) -> Result<NetworkHandle, NetworkError> {
        let services = self.services.as_ref().ok_or(NetworkError::NotStarted)?;
        Ok(NetworkHandle::new(
            self.local_peer_id,
            self.command_tx.clone(),
            self.event_tx.clone(),
            self.connected.clone(),
            services.transfer.clone(),
            self.relay.clone(),
            self.config.reservation_timeout,
        ))
    }

    /// Move the event loop and both stream listeners into `tasks`.
    pub fn spawn(
        mut self,
        tasks: &mut JoinSet<()>,
        cancel: CancellationToken,
    ) -> Result<NetworkHandle, NetworkError> {
        let handle = self.handle()?;
        let services = self.services.take().ok_or(NetworkError::NotStarted)?;

        tasks.spawn(
            services
                .exchange
                .clone()
                .run_listener(services.exchange_incoming, cancel.clone()),
        );
        tasks.spawn(
            services
                .transfer
                .run_listener(services.transfer_incoming, cancel.clone()),
        );

        let exchange = services.exchange;
        tasks.spawn(async move {
            if let Err(e) = self.run(exchange, cancel).await {
                tracing::error!(error = %e, "network event loop failed");
            }
        });
        Ok(handle)
    }

    /// Run the event loop until `cancel` fires or every handle is dropped.
    async fn run(
        &mut self,
        exchange: PeerExchange,
        cancel: CancellationToken,
    ) -> Result<(), NetworkError> {
        let mut command_rx = self.command_rx.take().ok_or(NetworkError::NotStarted)?;
        let mut announcements = JoinSet::new();

        tracing::info!(peer_id = %self.local_peer_id, "OrcaNet node event loop started");

        for peer_id in self.startup_announcements.drain(..) {
            announcements.spawn(exchange.clone().announce_to(peer_id));
        }

        enum Action {
            SwarmEvent(SwarmEvent<OrcaBehaviourEvent>),
            Command(NetworkCommand),
            Shutdown,
            CommandChannelClosed,
        }

        loop {
            let action = {
                let swarm = match self.swarm.as_mut() {
                    Some(s) => s,
                    None => break,
                };
                tokio::select! {
                    event = swarm.select_next_some() => Action::SwarmEvent(event),
                    cmd = command_rx.recv() => match cmd {
                        Some(c) => Action::Command(c),
                        None => Action::CommandChannelClosed,
                    },
                    _ = cancel.cancelled() => Action::Shutdown,
                    Some(_) = announcements.join_next(), if !announcements.is_empty() => continue,
                }
            };

            match action {
                Action::SwarmEvent(event) => {
                    if let Some(peer_id) = self.handle_swarm_event(event) {
                        announcements.spawn(exchange.clone().announce_to(peer_id));
                    }
                }
                Action::Command(cmd) => self.handle_command(cmd),
                Action::Shutdown => {
                    tracing::info!("OrcaNet node shutting down (cancelled)");
                    break;
                }
                Action::CommandChannelClosed => {
                    tracing::info!("OrcaNet node shutting down (command channel closed)");
                    break;
                }
            }
        }

        announcements.abort_all();
        self.fail_pending();
        self.swarm = None;
        tracing::info!(peer_id = %self.local_peer_id, "OrcaNet node stopped");
        Ok(())
    }

    fn fail_pending(&mut self) {
        for (_, query) in self.queries.drain() {
            match query {
                PendingQuery::GetRecord { reply, .. } => {
                    let _ = reply.send(Err(NetworkError::ShutDown));
                }
                PendingQuery::GetProviders { reply, .. } => {
                    let _ = reply.send(Err(NetworkError::ShutDown));
                }
                PendingQuery::PutRecord { reply } | PendingQuery::StartProviding { reply } => {
                    let _ = reply.send(Err(NetworkError::ShutDown));
                }
            }
        }
        if let Some(pending) = self.reservation.take() {
            let _ = pending.reply.send(Err(NetworkError::ShutDown));
        }
    }

    /// Handle a command from an external task (e.g., HTTP API).
    fn handle_command(&mut self, cmd: NetworkCommand) {
        let Some(swarm) = self.swarm.as_mut() else {
            return;
        };
        match cmd {
            NetworkCommand::PutRecord { key, value, reply } => {
                let record = kad::Record::new(key, value);
                match swarm.behaviour_mut().kademlia.put_record(record, kad::Quorum::One) {
                    Ok(id) => {
                        self.queries.insert(id, PendingQuery::PutRecord { reply });
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            NetworkCommand::GetRecord { key, label, reply } => {
                let id = swarm.behaviour_mut().kademlia.get_record(key);
                self.queries.insert(
                    id,
                    PendingQuery::GetRecord {
                        label,
                        values: Vec::new(),
                        reply,
                    },
                );
            }
            NetworkCommand::StartProviding { key, reply } => {
                match swarm.behaviour_mut().kademlia.start_providing(key) {
                    Ok(id) => {
                        self.queries.insert(id, PendingQuery::StartProviding { reply });
                    }
                    Err(e) => {
                        let _ = reply.send(Err(NetworkError::Provide(e.to_string())));
                    }
                }
            }
            NetworkCommand::StopProviding { key, reply } => {
                swarm.behaviour_mut().kademlia.stop_providing(&key);
                let _ = reply.send(Ok(()));
            }
            NetworkCommand::GetProviders { key, reply } => {
                let id = swarm.behaviour_mut().kademlia.get_providers(key);
                self.queries.insert(
                    id,
                    PendingQuery::GetProviders {
                        providers: HashSet::new(),
                        reply,
                    },
                );
            }
            NetworkCommand::Dial {
                peer_id,
                addr,
                reply,
            } => {
                if peer_id == self.local_peer_id || swarm.is_connected(&peer_id) {
                    let _ = reply.send(Ok(false));
                    return;
                }
                let opts = match addr {
                    Some(addr) => DialOpts::peer_id(peer_id).addresses(vec![addr]).build(),
                    None => DialOpts::peer_id(peer_id).build(),
                };
                let result = swarm.dial(opts).map(|_| true).map_err(NetworkError::from);
                if let Err(e) = &result {
                    tracing::debug!(%peer_id, error = %e, "dial failed");
                }
                let _ = reply.send(result);
            }
            NetworkCommand::AddAddress {
                peer_id,
                addr,
                reply,
            } => {
                swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                swarm.add_peer_address(peer_id, addr);
                let _ = reply.send(Ok(()));
            }
            NetworkCommand::MakeReservation { reply } => self.start_reservation(reply),
            NetworkCommand::ListenAddrs { reply } => {
                let _ = reply.send(Ok(swarm.listeners().cloned().collect()));
            }
            NetworkCommand::ActivePeers { reply } => {
                let _ = reply.send(Ok(swarm.connected_peers().copied().collect()));
            }
        }
    }

    fn start_reservation(&mut self, reply: oneshot::Sender<Result<(), NetworkError>>) {
        let (Some(relay), Some(swarm)) = (self.relay.as_ref(), self.swarm.as_mut()) else {
            let _ = reply.send(Err(NetworkError::Reservation("no relay configured".into())));
            return;
        };

        if let Some(old) = self.relay_listener.take() {
            swarm.remove_listener(old);
        }
        match swarm.listen_on(relay.listen_addr()) {
            Ok(listener) => {
                tracing::info!(relay = %relay.peer_id, "requesting relay reservation");
                self.relay_listener = Some(listener);
                if let Some(previous) = self.reservation.replace(PendingReservation { listener, reply }) {
                    let _ = previous
                        .reply
                        .send(Err(NetworkError::Reservation("superseded".into())));
                }
            }
            Err(e) => {
                let _ = reply.send(Err(NetworkError::Reservation(e.to_string())));
            }
        }
    }

    /// Handle a swarm event dispatched from the event loop. Returns a peer to
    /// announce our known peers to when a new connection came up.
    fn handle_swarm_event(&mut self, event: SwarmEvent<OrcaBehaviourEvent>) -> Option<PeerId> {
        match event {
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                endpoint,
                ..
            } => {
                let first_seen = self.connected.insert(peer_id);
                tracing::info!(
                    %peer_id,
                    address = %endpoint.get_remote_address(),
                    num_established,
                    first_seen,
                    bootstrap = self.discovery.is_bootstrap_peer(&peer_id),
                    "connection established"
                );
                let _ = self.event_tx.send(NetworkEvent::PeerConnected(PeerConnected {
                    peer_id,
                    first_seen,
                    num_known: self.connected.len(),
                }));
                if num_established.get() == 1 {
                    return Some(peer_id);
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                tracing::debug!(%peer_id, num_established, ?cause, "connection closed");
                if num_established == 0 {
                    self.connected.disconnected(&peer_id);
                    let _ = self
                        .event_tx
                        .send(NetworkEvent::PeerDisconnected(PeerDisconnected { peer_id }));
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(address = %address, "listening on new address");
                let _ = self.event_tx.send(NetworkEvent::Listening { address });
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, error = %error, "outgoing connection error");
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                tracing::debug!(error = %error, "incoming connection error");
            }
            SwarmEvent::ListenerClosed {
                listener_id,
                reason,
                ..
            } => {
                tracing::info!(?listener_id, ?reason, "listener closed");
                if self.relay_listener == Some(listener_id) {
                    self.relay_listener = None;
                }
                if self
                    .reservation
                    .as_ref()
                    .is_some_and(|p| p.listener == listener_id)
                {
                    if let Some(pending) = self.reservation.take() {
                        let msg = match reason {
                            Ok(()) => "relay listener closed".to_string(),
                            Err(e) => e.to_string(),
                        };
                        let _ = pending.reply.send(Err(NetworkError::Reservation(msg)));
                    }
                }
            }
            SwarmEvent::ListenerError { listener_id, error } => {
                tracing::warn!(?listener_id, error = %error, "listener error");
            }
            SwarmEvent::ExternalAddrConfirmed { address } => {
                tracing::info!(address = %address, "external address confirmed");
            }
            _ => {}
        }
        None
    }

    /// Handle a behaviour-level event from one of the sub-behaviours.
    fn handle_behaviour_event(&mut self, event: OrcaBehaviourEvent) {
        match event {
            OrcaBehaviourEvent::Kademlia(event) => self.handle_kad_event(event),

            OrcaBehaviourEvent::RelayClient(relay::client::Event::ReservationReqAccepted {
                relay_peer_id,
                renewal,
                ..
            }) => {
                tracing::info!(%relay_peer_id, renewal, "relay reservation accepted");
                if let Some(pending) = self.reservation.take() {
                    let _ = pending.reply.send(Ok(()));
                }
                let _ = self.event_tx.send(NetworkEvent::ReservationAccepted {
                    relay_peer_id,
                    renewal,
                });
            }
            OrcaBehaviourEvent::RelayClient(event) => {
                tracing::debug!(?event, "relay client event");
            }
            OrcaBehaviourEvent::RelayServer(event) => {
                tracing::debug!(?event, "relay service event");
            }
            OrcaBehaviourEvent::Dcutr(event) => {
                tracing::info!(peer = %event.remote_peer_id, result = ?event.result, "hole punch attempt");
            }
            OrcaBehaviourEvent::Autonat(autonat::Event::StatusChanged { old, new }) => {
                tracing::info!(?old, ?new, "NAT status changed");
            }
            OrcaBehaviourEvent::Autonat(_) => {}
            OrcaBehaviourEvent::Upnp(upnp::Event::NewExternalAddr(addr)) => {
                tracing::info!(address = %addr, "UPnP port mapping established");
            }
            OrcaBehaviourEvent::Upnp(upnp::Event::GatewayNotFound) => {
                tracing::debug!("no UPnP gateway found");
            }
            OrcaBehaviourEvent::Upnp(event) => {
                tracing::debug!(?event, "UPnP event");
            }

            OrcaBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. }) => {
                tracing::debug!(
                    %peer_id,
                    protocol_version = %info.protocol_version,
                    agent_version = %info.agent_version,
                    "identify: received peer info"
                );
                // Only DHT servers belong in the routing table.
                if info.protocols.iter().any(|p| *p == kad::PROTOCOL_NAME) {
                    if let Some(ref mut swarm) = self.swarm {
                        for addr in info.listen_addrs {
                            swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                        }
                    }
                }
            }
            OrcaBehaviourEvent::Identify(_) => {}
            OrcaBehaviourEvent::Ping(_) => {}
            OrcaBehaviourEvent::Stream(_) => {}
        }
    }

    fn handle_kad_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::InboundRequest {
                request:
                    kad::InboundRequest::PutRecord {
                        source,
                        record: Some(record),
                        ..
                    },
            } => self.store_inbound_record(source, record),
            kad::Event::InboundRequest {
                request:
                    kad::InboundRequest::AddProvider {
                        record: Some(provider),
                    },
            } => {
                if let Some(ref mut swarm) = self.swarm {
                    if let Err(e) = swarm.behaviour_mut().kademlia.store_mut().add_provider(provider) {
                        tracing::warn!(error = %e, "failed to store provider record");
                    }
                }
            }
            kad::Event::InboundRequest { request } => {
                tracing::trace!(?request, "kademlia inbound request");
            }
            kad::Event::RoutingUpdated {
                peer, is_new_peer, ..
            } => {
                tracing::debug!(%peer, is_new_peer, "kademlia routing updated");
            }
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => self.handle_query_result(id, result, step.last),
            kad::Event::ModeChanged { new_mode } => {
                tracing::info!(mode = %new_mode, "kademlia mode changed");
            }
            _ => {}
        }
    }

    fn store_inbound_record(&mut self, source: PeerId, record: kad::Record) {
        let verdict = key_str(&record.key).and_then(|key| self.validator.validate(key, &record.value));
        match verdict {
            Ok(()) => {
                if let Some(ref mut swarm) = self.swarm {
                    match swarm.behaviour_mut().kademlia.store_mut().put(record) {
                        Ok(()) => tracing::debug!(%source, "stored inbound record"),
                        Err(e) => tracing::warn!(%source, error = %e, "failed to store inbound record"),
                    }
                }
            }
            Err(e) => tracing::warn!(%source, error = %e, "rejected inbound record"),
        }
    }

    fn handle_query_result(&mut self, id: QueryId, result: QueryResult, last: bool) {
        match result {
            QueryResult::GetRecord(Ok(GetRecordOk::FoundRecord(peer_record))) => {
                if let Some(PendingQuery::GetRecord { values, .. }) = self.queries.get_mut(&id) {
                    values.push(peer_record.record.value);
                }
                if last {
                    self.finish_get_record(id);
                }
            }
            QueryResult::GetRecord(Ok(GetRecordOk::FinishedWithNoAdditionalRecord { .. })) => {
                self.finish_get_record(id);
            }
            QueryResult::GetRecord(Err(e)) => {
                tracing::debug!(error = %e, "get_record finished with error");
                self.finish_get_record(id);
            }
            QueryResult::PutRecord(result) => {
                if let Some(PendingQuery::PutRecord { reply }) = self.queries.remove(&id) {
                    let result = result
                        .map(|_| ())
                        .map_err(|e| NetworkError::Kademlia(format!("put_record: {}", e)));
                    let _ = reply.send(result);
                }
            }
            QueryResult::StartProviding(result) => {
                if let Some(PendingQuery::StartProviding { reply }) = self.queries.remove(&id) {
                    let result = result
                        .map(|_| ())
                        .map_err(|e| NetworkError::Provide(e.to_string()));
                    let _ = reply.send(result);
                }
            }
            QueryResult::GetProviders(Ok(GetProvidersOk::FoundProviders { providers, .. })) => {
                if let Some(PendingQuery::GetProviders { providers: found, .. }) =
                    self.queries.get_mut(&id)
                {
                    found.extend(providers);
                }
                if last {
                    self.finish_get_providers(id);
                }
            }
            QueryResult::GetProviders(Ok(GetProvidersOk::FinishedWithNoAdditionalRecord {
                ..
            })) => self.finish_get_providers(id),
            QueryResult::GetProviders(Err(e)) => {
                tracing::debug!(error = %e, "get_providers finished with error");
                self.finish_get_providers(id);
            }
            QueryResult::Bootstrap(Ok(ok)) => {
                tracing::debug!(peer = %ok.peer, remaining = ok.num_remaining, "bootstrap progressed");
            }
            QueryResult::Bootstrap(Err(e)) => {
                tracing::warn!(error = %e, "kademlia bootstrap query failed");
            }
            other => {
                tracing::trace!(?other, "kademlia query progressed");
            }
        }
    }

    fn finish_get_record(&mut self, id: QueryId) {
        if let Some(PendingQuery::GetRecord {
            label,
            values,
            reply,
        }) = self.queries.remove(&id)
        {
            let result = if values.is_empty() {
                Err(NetworkError::NotFound(label))
            } else {
                Ok(values)
            };
            let _ = reply.send(result);
        }
    }

    fn finish_get_providers(&mut self, id: QueryId) {
        if let Some(PendingQuery::GetProviders { providers, reply }) = self.queries.remove(&id) {
            let _ = reply.send(Ok(providers));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::NamespacedValidator;
    use orcanet_core::MemoryMetadataStore;

    fn make_node(config: NodeConfig) -> Result<OrcaNode, NetworkError> {
        OrcaNode::new(
            Keypair::generate_ed25519(),
            config,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(NamespacedValidator::orcanet()),
        )
    }

    fn loopback_config() -> NodeConfig {
        NodeConfig {
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".into()],
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_node_config_default() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addrs, vec!["/ip4/0.0.0.0/tcp/60000".to_string()]);
        assert!(config.bootstrap_peers.is_empty());
        assert!(config.relay_addr.is_none());
        assert_eq!(config.dht_mode, DhtMode::Client);
        assert_eq!(config.reply_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_node_creation() {
        let node = make_node(NodeConfig::default()).expect("node creation");
        assert!(!node.is_running());
        assert!(node.connected_peers().is_empty());
    }

    #[test]
    fn test_node_rejects_bad_relay() {
        let config = NodeConfig {
            relay_addr: Some("/ip4/1.2.3.4/tcp/4001".into()),
            ..NodeConfig::default()
        };
        assert!(make_node(config).is_err());
    }

    #[test]
    fn test_handle_before_start() {
        let node = make_node(NodeConfig::default()).unwrap();
        assert!(matches!(node.handle(), Err(NetworkError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_binds_loopback() {
        let mut node = make_node(loopback_config()).unwrap();
        let addrs = node.start().await.expect("start");
        assert!(!addrs.is_empty());
        assert!(addrs[0].to_string().starts_with("/ip4/127.0.0.1/tcp/"));
        assert!(node.is_running());

        let again = node.start().await;
        assert!(matches!(again, Err(NetworkError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_start_with_bad_listen_addr() {
        let config = NodeConfig {
            listen_addrs: vec!["not-an-addr".into()],
            ..NodeConfig::default()
        };
        let mut node = make_node(config).unwrap();
        assert!(matches!(node.start().await, Err(NetworkError::Listen(_))));
    }

    #[tokio::test]
    async fn test_reservation_without_relay_fails() {
        let mut node = make_node(loopback_config()).unwrap();
        node.start().await.unwrap();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let handle = node.spawn(&mut tasks, cancel.clone()).unwrap();

        let err = handle.make_reservation().await.unwrap_err();
        assert!(matches!(err, NetworkError::Reservation(_)));

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_get_missing_record_is_not_found() {
        let mut node = make_node(NodeConfig {
            query_timeout: Duration::from_secs(5),
            ..loopback_config()
        })
        .unwrap();
        node.start().await.unwrap();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let handle = node.spawn(&mut tasks, cancel.clone()).unwrap();

        let err = handle.get_record("/orcanet/proxy/nobody").await.unwrap_err();
        assert!(matches!(err, NetworkError::NotFound(_)));

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let mut node = make_node(loopback_config()).unwrap();
        node.start().await.unwrap();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let handle = node.spawn(&mut tasks, cancel.clone()).unwrap();

        cancel.cancel();
        while tasks.join_next().await.is_some() {}

        let result = handle.listen_addrs().await;
        assert!(matches!(result, Err(NetworkError::ShutDown)));
    }

    #[tokio::test]
    async fn test_start_fails_when_bootstrap_is_unreachable() {
        let dead = format!("/ip4/127.0.0.1/tcp/1/p2p/{}", PeerId::random());
        let mut node = make_node(NodeConfig {
            bootstrap_peers: vec![dead],
            query_timeout: Duration::from_secs(3),
            ..loopback_config()
        })
        .unwrap();

        let err = node.start().await.unwrap_err();
        assert!(matches!(err, NetworkError::Bootstrap(_)), "got {err:?}");
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn test_peer_met_during_bootstrap_gets_announcement() {
        let mut seed = make_node(NodeConfig {
            dht_mode: DhtMode::Server,
            ..loopback_config()
        })
        .unwrap();
        let seed_addr = seed.start().await.unwrap().remove(0);
        let seed_id = *seed.local_peer_id();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let seed_handle = seed.spawn(&mut tasks, cancel.clone()).unwrap();
        let mut seed_events = seed_handle.subscribe();

        let mut joiner = make_node(NodeConfig {
            bootstrap_peers: vec![format!("{}/p2p/{}", seed_addr, seed_id)],
            query_timeout: Duration::from_secs(5),
            ..loopback_config()
        })
        .unwrap();
        joiner.start().await.expect("bootstrap against a live seed");
        let joiner_id = *joiner.local_peer_id();
        assert!(joiner.connected_peers().contains(&seed_id));
        let _joiner_handle = joiner.spawn(&mut tasks, cancel.clone()).unwrap();

        // The joiner connected before its event loop ran; its list still arrives.
        let wait = async {
            loop {
                match seed_events.recv().await {
                    Ok(NetworkEvent::PeersExchanged(px)) if px.from == joiner_id => return px,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        };
        let px = tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .expect("joiner never announced");
        assert!(px.peers.is_empty());

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }
}
