//! libp2p transport stack construction for the OrcaNet network.
//!
//! TCP and QUIC, Noise, Yamux and DNS, plus the relay client transport so the
//! node can listen on and dial `/p2p-circuit` addresses.

use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::{noise, tcp, yamux, Swarm, SwarmBuilder};

use crate::behaviour::{DhtMode, OrcaBehaviour};
use crate::error::NetworkError;

/// Options for building the OrcaNet swarm.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub dht_mode: DhtMode,
    pub query_timeout: Duration,
    pub idle_connection_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dht_mode: DhtMode::Client,
            query_timeout: Duration::from_secs(60),
            idle_connection_timeout: Duration::from_secs(300),
        }
    }
}

/// Build a libp2p Swarm with the OrcaNet behaviour.
pub fn build_swarm(
    keypair: Keypair,
    config: &TransportConfig,
) -> Result<Swarm<OrcaBehaviour>, NetworkError> {
    let mode = config.dht_mode;
    let query_timeout = config.query_timeout;
    let idle = config.idle_connection_timeout;

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_quic()
        .with_dns()
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_relay_client(noise::Config::new, yamux::Config::default)
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_behaviour(|key, relay_client| {
            OrcaBehaviour::new(key, relay_client, mode, query_timeout)
        })
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle))
        .build();

    Ok(swarm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.dht_mode, DhtMode::Client);
        assert_eq!(config.query_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_build_swarm_success() {
        let keypair = Keypair::generate_ed25519();
        let expected = keypair.public().to_peer_id();
        let swarm = build_swarm(keypair, &TransportConfig::default()).expect("swarm");
        assert_eq!(*swarm.local_peer_id(), expected);
    }
}
