/// Errors from identity derivation and content addressing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("multihash error: {0}")]
    Multihash(String),
}
