//! The private `/orcanet/...` DHT key namespace.
//!
//! Only the owning peer writes under its own `<peerID>` sub-path, but nothing
//! on the wire enforces that (see the record validator in `orcanet-network`).
//! Records are never deleted; a tombstone value is written instead.

use std::fmt;

use crate::error::CoreError;

/// Namespace segment shared by every OrcaNet record key.
pub const NAMESPACE: &str = "orcanet";

/// Value written in place of a deleted record.
pub const TOMBSTONE: &str = "null";

/// A typed OrcaNet DHT record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DhtKey {
    /// `/orcanet/files/<peerID>/<fileHash>`: decimal price or tombstone.
    File { peer_id: String, hash: String },
    /// `/orcanet/proxy/<peerID>`: JSON `ProxyInfo`, or empty.
    Proxy { peer_id: String },
    /// `/orcanet/wallet/<peerID>`: JSON-quoted wallet address.
    Wallet { peer_id: String },
}

impl DhtKey {
    pub fn file(peer_id: impl fmt::Display, hash: &str) -> Self {
        Self::File {
            peer_id: peer_id.to_string(),
            hash: hash.trim().to_string(),
        }
    }

    pub fn proxy(peer_id: impl fmt::Display) -> Self {
        Self::Proxy {
            peer_id: peer_id.to_string(),
        }
    }

    pub fn wallet(peer_id: impl fmt::Display) -> Self {
        Self::Wallet {
            peer_id: peer_id.to_string(),
        }
    }

    /// The peer whose sub-path this key lives under.
    pub fn owner(&self) -> &str {
        match self {
            DhtKey::File { peer_id, .. }
            | DhtKey::Proxy { peer_id }
            | DhtKey::Wallet { peer_id } => peer_id,
        }
    }

    /// Parse a full key string such as `/orcanet/files/<peer>/<hash>`.
    pub fn parse(key: &str) -> Result<Self, CoreError> {
        let rest = key
            .strip_prefix('/')
            .and_then(|k| k.strip_prefix(NAMESPACE))
            .and_then(|k| k.strip_prefix('/'))
            .ok_or_else(|| CoreError::InvalidKey(format!("'{}' is outside /{}", key, NAMESPACE)))?;

        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            ["files", peer, hash] if !peer.is_empty() && !hash.is_empty() => {
                Ok(Self::file(peer, hash))
            }
            ["proxy", peer] if !peer.is_empty() => Ok(Self::proxy(peer)),
            ["wallet", peer] if !peer.is_empty() => Ok(Self::wallet(peer)),
            _ => Err(CoreError::InvalidKey(key.to_string())),
        }
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtKey::File { peer_id, hash } => write!(f, "/{}/files/{}/{}", NAMESPACE, peer_id, hash),
            DhtKey::Proxy { peer_id } => write!(f, "/{}/proxy/{}", NAMESPACE, peer_id),
            DhtKey::Wallet { peer_id } => write!(f, "/{}/wallet/{}", NAMESPACE, peer_id),
        }
    }
}

/// Extract the namespace segment of a key: `/orcanet/files/x` → `orcanet`.
pub fn namespace_of(key: &str) -> Option<&str> {
    let rest = key.strip_prefix('/')?;
    let (ns, tail) = rest.split_once('/')?;
    if ns.is_empty() || tail.is_empty() {
        return None;
    }
    Some(ns)
}

/// Whether a stored value is the deletion marker. Both spellings are honoured.
pub fn is_tombstone(value: &[u8]) -> bool {
    value == b"null" || value == b"NULL"
}

/// Render a cost the way it is stored in file records: shortest decimal form.
pub fn format_price(cost: f64) -> String {
    cost.to_string()
}

/// Parse a decimal price string.
pub fn parse_price(raw: &str) -> Result<f64, CoreError> {
    let price: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidPrice(raw.to_string()))?;
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::InvalidPrice(raw.to_string()));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_format() {
        let key = DhtKey::file("12D3KooWPeer", "abc123");
        assert_eq!(key.to_string(), "/orcanet/files/12D3KooWPeer/abc123");
        assert_eq!(key.owner(), "12D3KooWPeer");
    }

    #[test]
    fn test_file_key_trims_hash() {
        let key = DhtKey::file("peer", "  abc \n");
        assert_eq!(key.to_string(), "/orcanet/files/peer/abc");
    }

    #[test]
    fn test_proxy_and_wallet_keys() {
        assert_eq!(DhtKey::proxy("p1").to_string(), "/orcanet/proxy/p1");
        assert_eq!(DhtKey::wallet("p1").to_string(), "/orcanet/wallet/p1");
    }

    #[test]
    fn test_parse_known_keys() {
        assert_eq!(
            DhtKey::parse("/orcanet/files/p/h").unwrap(),
            DhtKey::file("p", "h")
        );
        assert_eq!(DhtKey::parse("/orcanet/proxy/p").unwrap(), DhtKey::proxy("p"));
        assert_eq!(DhtKey::parse("/orcanet/wallet/p").unwrap(), DhtKey::wallet("p"));
    }

    #[test]
    fn test_parse_rejects_foreign_namespace() {
        assert!(DhtKey::parse("/ipns/files/p/h").is_err());
        assert!(DhtKey::parse("orcanet/files/p/h").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(DhtKey::parse("/orcanet/files/p").is_err());
        assert!(DhtKey::parse("/orcanet/proxy/").is_err());
        assert!(DhtKey::parse("/orcanet/unknown/p").is_err());
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(namespace_of("/orcanet/files/a/b"), Some("orcanet"));
        assert_eq!(namespace_of("/pk/abc"), Some("pk"));
        assert_eq!(namespace_of("/orcanet"), None);
        assert_eq!(namespace_of("orcanet/x"), None);
        assert_eq!(namespace_of("//x"), None);
    }

    #[test]
    fn test_tombstone_both_spellings() {
        assert!(is_tombstone(b"null"));
        assert!(is_tombstone(b"NULL"));
        assert!(!is_tombstone(b"Null"));
        assert!(!is_tombstone(b"1.5"));
        assert!(!is_tombstone(b""));
    }

    #[test]
    fn test_format_price_shortest_form() {
        assert_eq!(format_price(1.5), "1.5");
        assert_eq!(format_price(2.0), "2");
        assert_eq!(format_price(0.0), "0");
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 1.5 ").unwrap(), 1.5);
        assert!(parse_price("abc").is_err());
        assert!(parse_price("-1").is_err());
        assert!(parse_price("NaN").is_err());
    }
}
