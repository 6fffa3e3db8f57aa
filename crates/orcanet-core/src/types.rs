use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor a peer publishes at `/orcanet/proxy/<peerID>` when it offers
/// itself as a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyInfo {
    #[serde(rename = "peerID")]
    pub peer_id: String,
    pub name: String,
    pub location: String,
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    #[serde(rename = "initialFee")]
    pub initial_fee: String,
    pub price: String,
    pub port: u16,
}

impl ProxyInfo {
    /// Decode a stored proxy value. Empty values and tombstones mean the peer
    /// is not a proxy.
    pub fn from_record_value(value: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let trimmed = value.trim_ascii();
        if trimmed.is_empty() || crate::keys::is_tombstone(trimmed) {
            return Ok(None);
        }
        serde_json::from_slice(trimmed).map(Some)
    }
}

/// A file this node hosts, as kept by the local metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Hex-encoded SHA-256 of the file contents.
    pub hash: String,
    /// Name of the file inside the node's files directory.
    pub filename: String,
    /// Asking price.
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(hash: impl Into<String>, filename: impl Into<String>, cost: f64) -> Self {
        Self {
            hash: hash.into(),
            filename: filename.into(),
            cost,
            timestamp: Utc::now(),
        }
    }
}

/// One entry of a provider lookup: who serves a file and at what price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderListing {
    /// Provider peer ID, or `"Me"` for this node.
    pub id: String,
    /// Price exactly as stored in the DHT.
    pub cost: String,
}

/// Peer-exchange payload: `{"known_peers":[{"peer_id":"..."}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPeers {
    #[serde(default)]
    pub known_peers: Vec<KnownPeer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub peer_id: String,
}

impl KnownPeers {
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Self {
            known_peers: ids
                .into_iter()
                .map(|id| KnownPeer {
                    peer_id: id.to_string(),
                })
                .collect(),
        }
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &str> {
        self.known_peers.iter().map(|p| p.peer_id.as_str())
    }
}
