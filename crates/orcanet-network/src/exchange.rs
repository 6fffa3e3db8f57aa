//! Peer-exchange gossip over `/orcanet/p2p`.
//!
//! When a connection comes up we tell the new peer about everyone else we are
//! connected to. When a peer tells us, we dial the peers we learned about
//! through the relay circuit.

use futures::io::BufReader;
use futures::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, StreamExt};
use libp2p::{PeerId, Stream};
use libp2p_stream::{Control, IncomingStreams};
use orcanet_core::KnownPeers;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::discovery::ConnectedPeers;
use crate::error::NetworkError;
use crate::events::{NetworkEvent, PeersExchanged};
use crate::node::NetworkCommand;
use crate::protocol::{EXCHANGE_PROTOCOL, MAX_EXCHANGE_LINE};
use crate::relay::RelayTarget;

/// Peers to announce to `new_peer`: everyone connected except the relay, the
/// new peer itself and us.
pub fn known_peers_for(
    connected: &[PeerId],
    local: &PeerId,
    relay: Option<&PeerId>,
    new_peer: &PeerId,
) -> KnownPeers {
    KnownPeers::from_ids(
        connected
            .iter()
            .filter(|p| *p != local && *p != new_peer && Some(*p) != relay),
    )
}

/// Peers from a received list worth dialing. Unparseable ids are skipped.
pub fn peers_to_dial(received: &KnownPeers, local: &PeerId, relay: Option<&PeerId>) -> Vec<PeerId> {
    let mut out = Vec::new();
    for raw in received.peer_ids() {
        match raw.parse::<PeerId>() {
            Ok(peer) if peer != *local && Some(&peer) != relay && !out.contains(&peer) => {
                out.push(peer)
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(peer_id = %raw, error = %e, "ignoring bad peer id"),
        }
    }
    out
}

#[derive(Clone)]
pub struct PeerExchange {
    control: Control,
    local_peer_id: PeerId,
    relay: Option<RelayTarget>,
    connected: ConnectedPeers,
    commands: mpsc::Sender<NetworkCommand>,
    events: broadcast::Sender<NetworkEvent>,
}

impl PeerExchange {
    pub(crate) fn new(
        control: Control,
        local_peer_id: PeerId,
        relay: Option<RelayTarget>,
        connected: ConnectedPeers,
        commands: mpsc::Sender<NetworkCommand>,
        events: broadcast::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            control,
            local_peer_id,
            relay,
            connected,
            commands,
            events,
        }
    }

    fn relay_id(&self) -> Option<&PeerId> {
        self.relay.as_ref().map(|r| &r.peer_id)
    }

    /// Send our known peers to a newly connected peer. Failures are expected
    /// (the peer may not speak the protocol) and only logged.
    pub async fn announce_to(mut self, peer: PeerId) {
        if let Err(e) = self.try_announce(peer).await {
            tracing::debug!(%peer, error = %e, "peer exchange not delivered");
        }
    }

    async fn try_announce(&mut self, peer: PeerId) -> Result<(), NetworkError> {
        let payload = known_peers_for(
            &self.connected.active(),
            &self.local_peer_id,
            self.relay_id(),
            &peer,
        );
        let mut line = serde_json::to_vec(&payload)?;
        line.push(b'\n');

        let mut stream = self.control.open_stream(peer, EXCHANGE_PROTOCOL).await?;
        stream.write_all(&line).await?;
        stream.close().await?;
        tracing::debug!(%peer, count = payload.known_peers.len(), "known peers sent");
        Ok(())
    }

    /// Serve inbound exchange streams until cancelled.
    pub async fn run_listener(self, mut incoming: IncomingStreams, cancel: CancellationToken) {
        let mut streams = JoinSet::new();
        tracing::info!("peer exchange listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = incoming.next() => match next {
                    Some((peer, stream)) => {
                        let this = self.clone();
                        streams.spawn(async move {
                            if let Err(e) = this.handle_inbound(peer, stream).await {
                                tracing::debug!(%peer, error = %e, "peer exchange failed");
                            }
                        });
                    }
                    None => break,
                },
                Some(_) = streams.join_next(), if !streams.is_empty() => {}
            }
        }
        streams.abort_all();
        tracing::info!("peer exchange listener stopped");
    }

    async fn handle_inbound(&self, from: PeerId, stream: Stream) -> Result<(), NetworkError> {
        let mut reader = BufReader::new(stream.take(MAX_EXCHANGE_LINE));
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let received: KnownPeers = serde_json::from_str(line)?;
        let peers = peers_to_dial(&received, &self.local_peer_id, self.relay_id());
        tracing::info!(%from, received = received.known_peers.len(), dialing = peers.len(), "known peers received");

        for peer in &peers {
            self.dial(*peer).await;
        }

        let _ = self.events.send(NetworkEvent::PeersExchanged(PeersExchanged {
            from,
            peers,
        }));
        Ok(())
    }

    async fn dial(&self, peer_id: PeerId) {
        let addr = self.relay.as_ref().map(|r| r.circuit_addr(peer_id));
        let (reply, rx) = oneshot::channel();
        let cmd = NetworkCommand::Dial {
            peer_id,
            addr,
            reply,
        };
        if self.commands.send(cmd).await.is_err() {
            return;
        }
        match rx.await {
            Ok(Ok(true)) => tracing::debug!(%peer_id, "dialing exchanged peer"),
            Ok(Ok(false)) => tracing::trace!(%peer_id, "exchanged peer already connected"),
            Ok(Err(e)) => tracing::debug!(%peer_id, error = %e, "failed to dial exchanged peer"),
            Err(_) => {}
        }
    }
}
