pub mod content;
pub mod error;
pub mod hashing;
pub mod identity;

pub use content::{content_id, provider_key};
pub use error::CryptoError;
pub use hashing::{sha256, sha256_hex, Sha256Hash};
pub use identity::{keypair_from_seed, peer_id_from_seed};
