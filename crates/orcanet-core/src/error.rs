/// Core protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid DHT key: {0}")]
    InvalidKey(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("file record already exists: {0}")]
    DuplicateRecord(String),
}
