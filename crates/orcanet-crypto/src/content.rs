//! Content identifiers for provider records.
//!
//! A provided key is addressed by the sha2-256 multihash of the key string,
//! wrapped in a CIDv1 with the raw codec. Kademlia provider records carry the
//! multihash bytes, which keeps them interoperable with other DHT
//! implementations that advertise the same content.

use cid::multihash::Multihash;
use cid::Cid;

use crate::error::CryptoError;
use crate::hashing::sha256;

/// Multicodec code for sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Multicodec code for raw binary content.
pub const RAW: u64 = 0x55;

fn multihash_of(key: &str) -> Result<Multihash<64>, CryptoError> {
    Multihash::<64>::wrap(SHA2_256, &sha256(key.as_bytes()))
        .map_err(|e| CryptoError::Multihash(e.to_string()))
}

/// CIDv1 (raw, sha2-256) addressing a provided key.
pub fn content_id(key: &str) -> Result<Cid, CryptoError> {
    Ok(Cid::new_v1(RAW, multihash_of(key)?))
}

/// Bytes used as the Kademlia provider key for `key`.
pub fn provider_key(key: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(content_id(key)?.hash().to_bytes())
}
