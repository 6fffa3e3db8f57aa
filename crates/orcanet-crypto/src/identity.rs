//! Deterministic node identity.
//!
//! The ed25519 secret key is the SHA-256 digest of a seed string, so a node
//! redeployed with the same seed keeps the same `PeerId`. Relay and bootstrap
//! operators rely on this to publish stable multiaddresses.

use libp2p::identity::Keypair;
use libp2p::PeerId;

use crate::error::CryptoError;
use crate::hashing::sha256;

/// Derive the node keypair from a seed string.
pub fn keypair_from_seed(seed: &str) -> Result<Keypair, CryptoError> {
    // `ed25519_from_bytes` zeroizes the buffer it is given.
    let secret = sha256(seed.as_bytes());
    let keypair = Keypair::ed25519_from_bytes(secret)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    tracing::debug!(peer_id = %keypair.public().to_peer_id(), "derived identity from seed");
    Ok(keypair)
}

/// The `PeerId` a seed yields.
pub fn peer_id_from_seed(seed: &str) -> Result<PeerId, CryptoError> {
    Ok(keypair_from_seed(seed)?.public().to_peer_id())
}
