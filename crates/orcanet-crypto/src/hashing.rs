use sha2::{Digest, Sha256};

/// SHA-256 digest (32 bytes).
pub type Sha256Hash = [u8; 32];

/// Hash arbitrary data using SHA-256.
pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

/// Hex-encoded SHA-256, the form file hashes take in keys and records.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
