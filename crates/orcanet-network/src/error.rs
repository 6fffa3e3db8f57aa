//! Network error types for the OrcaNet P2P layer.

use libp2p::{kad, noise, TransportError};

/// Errors that can occur in the OrcaNet network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Transport-level error (TCP, QUIC, Noise, Yamux, relay transport).
    #[error("transport error: {0}")]
    Transport(String),

    /// Kademlia DHT error.
    #[error("kademlia error: {0}")]
    Kademlia(String),

    /// No value is stored under the key anywhere we looked.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The record validator refused a key or value.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Provider advertisement could not be started.
    #[error("failed to start providing key: {0}")]
    Provide(String),

    /// Provider advertisement could not be withdrawn.
    #[error("failed to stop providing key: {0}")]
    Unprovide(String),

    /// Kademlia bootstrap failed.
    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    /// Relay reservation could not be made.
    #[error("reservation error: {0}")]
    Reservation(String),

    /// Failed to dial a peer.
    #[error("dial error: {0}")]
    Dial(String),

    /// Error listening on an address.
    #[error("listen error: {0}")]
    Listen(String),

    /// A stream could not be opened or failed mid-transfer.
    #[error("stream error: {0}")]
    Stream(String),

    /// Malformed frame or payload.
    #[error("codec error: {0}")]
    Codec(String),

    /// An awaited reply did not arrive in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The node has not been started yet.
    #[error("node not started")]
    NotStarted,

    /// The node is already running.
    #[error("node already running")]
    AlreadyRunning,

    /// The node has been shut down.
    #[error("node shut down")]
    ShutDown,

    /// Error from the core layer.
    #[error("core error: {0}")]
    Core(#[from] orcanet_core::CoreError),

    /// Error from identity or content addressing.
    #[error("crypto error: {0}")]
    Crypto(#[from] orcanet_crypto::CryptoError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<noise::Error> for NetworkError {
    fn from(err: noise::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<TransportError<T>> for NetworkError {
    fn from(err: TransportError<T>) -> Self {
        NetworkError::Listen(format!("{:?}", err))
    }
}

impl From<libp2p::multiaddr::Error> for NetworkError {
    fn from(err: libp2p::multiaddr::Error) -> Self {
        NetworkError::Transport(err.to_string())
    }
}

impl From<kad::store::Error> for NetworkError {
    fn from(err: kad::store::Error) -> Self {
        NetworkError::Kademlia(err.to_string())
    }
}

impl From<libp2p::swarm::DialError> for NetworkError {
    fn from(err: libp2p::swarm::DialError) -> Self {
        NetworkError::Dial(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Codec(err.to_string())
    }
}

impl From<libp2p_stream::OpenStreamError> for NetworkError {
    fn from(err: libp2p_stream::OpenStreamError) -> Self {
        NetworkError::Stream(err.to_string())
    }
}
