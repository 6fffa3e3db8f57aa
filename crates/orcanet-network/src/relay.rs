//! Relay reservation management.
//!
//! A node behind NAT listens on `<relay>/p2p-circuit` so that other peers can
//! reach it at `<relay>/p2p-circuit/p2p/<self>`. The relay grants a time-limited
//! reservation, which [`refresh_reservation`] re-issues on a timer.

use std::str::FromStr;
use std::time::Duration;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tokio_util::sync::CancellationToken;

use crate::discovery::split_peer_addr;
use crate::error::NetworkError;
use crate::handle::NetworkHandle;

/// How often the reservation is re-issued.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// How long to wait for the relay to accept a reservation.
pub const DEFAULT_RESERVATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A relay node given as `/.../p2p/<relay id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub peer_id: PeerId,
    /// Full address including the `/p2p/<relay id>` suffix.
    pub addr: Multiaddr,
}

impl RelayTarget {
    pub fn parse(addr: &str) -> Result<Self, NetworkError> {
        let addr = Multiaddr::from_str(addr)
            .map_err(|e| NetworkError::Transport(format!("invalid relay addr '{}': {}", addr, e)))?;
        let (peer_id, _) = split_peer_addr(&addr).ok_or_else(|| {
            NetworkError::Transport(format!("relay addr '{}' has no /p2p/<peer id> suffix", addr))
        })?;
        Ok(Self { peer_id, addr })
    }

    /// Address to listen on to obtain a reservation.
    pub fn listen_addr(&self) -> Multiaddr {
        self.addr.clone().with(Protocol::P2pCircuit)
    }

    /// Address of `target` reached through this relay.
    pub fn circuit_addr(&self, target: PeerId) -> Multiaddr {
        self.addr
            .clone()
            .with(Protocol::P2pCircuit)
            .with(Protocol::P2p(target))
    }
}

/// Re-issue the relay reservation every `interval` until `cancel` fires.
///
/// Failures are logged and the loop keeps going.
pub async fn refresh_reservation(
    handle: NetworkHandle,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial reservation is made at startup.
    ticker.tick().await;

    tracing::info!(interval_secs = interval.as_secs(), "reservation refresh started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match handle.make_reservation().await {
                    Ok(()) => tracing::info!("relay reservation refreshed"),
                    Err(e) => tracing::warn!(error = %e, "failed to refresh relay reservation"),
                }
            }
        }
    }
    tracing::info!("reservation refresh stopped");
}
