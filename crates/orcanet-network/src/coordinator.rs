//! Provider/record coordination on top of the DHT.
//!
//! Keeps the key/value records under `/orcanet/...` and the provider index in
//! step: files are published as a price record plus a provider advertisement
//! of the file hash, and withdrawn by writing a tombstone and dropping the
//! advertisement.

use std::collections::HashSet;
use std::sync::Arc;

use libp2p::PeerId;
use orcanet_core::keys::{format_price, is_tombstone};
use orcanet_core::{DhtKey, MetadataStore, ProviderListing, ProxyInfo, TOMBSTONE};
use orcanet_crypto::provider_key;

use crate::dht::Dht;
use crate::error::NetworkError;
use crate::validator::RecordValidator;

/// What a node publishes about itself when it offers proxy service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRegistration {
    pub name: String,
    pub location: String,
    pub ip_address: String,
    pub initial_fee: String,
    pub price: String,
    pub port: u16,
}

/// Outcome of replaying the local store into the DHT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub published: usize,
    pub failed: usize,
}

pub struct Coordinator {
    dht: Arc<dyn Dht>,
    validator: Arc<dyn RecordValidator>,
}

impl Coordinator {
    pub fn new(dht: Arc<dyn Dht>, validator: Arc<dyn RecordValidator>) -> Self {
        Self { dht, validator }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.dht.local_peer_id()
    }

    /// Validate locally, then store with quorum one.
    pub async fn put_record(&self, key: &str, value: Vec<u8>) -> Result<(), NetworkError> {
        self.validator.validate(key, &value)?;
        self.dht.put_record(key, value).await?;
        tracing::debug!(key = %key, "record stored");
        Ok(())
    }

    /// The value the validator selects among all values found.
    pub async fn get_record(&self, key: &str) -> Result<Vec<u8>, NetworkError> {
        let values = self.dht.get_record(key).await?;
        let index = self.validator.select(key, &values)?;
        values
            .into_iter()
            .nth(index)
            .ok_or_else(|| NetworkError::NotFound(key.to_string()))
    }

    /// Start or stop advertising this node as a provider of `key`.
    pub async fn advertise(&self, key: &str, enable: bool) -> Result<(), NetworkError> {
        let provider = provider_key(key)?;
        if enable {
            self.dht.start_providing(provider).await.map_err(|e| match e {
                NetworkError::Provide(_) => e,
                other => NetworkError::Provide(other.to_string()),
            })?;
            tracing::info!(key = %key, "providing key");
        } else {
            self.dht.stop_providing(provider).await.map_err(|e| match e {
                NetworkError::Unprovide(_) => e,
                other => NetworkError::Unprovide(other.to_string()),
            })?;
            tracing::info!(key = %key, "stopped providing key");
        }
        Ok(())
    }

    pub async fn resolve_providers(&self, key: &str) -> Result<HashSet<PeerId>, NetworkError> {
        self.dht.get_providers(provider_key(key)?).await
    }

    /// Providers of a file with their asking price. Providers whose record is
    /// a tombstone or cannot be read are dropped; this node is listed as `Me`.
    pub async fn list_file_providers(&self, hash: &str) -> Result<Vec<ProviderListing>, NetworkError> {
        let hash = hash.trim();
        let local = self.local_peer_id();
        let mut providers: Vec<PeerId> = self.resolve_providers(hash).await?.into_iter().collect();
        providers.sort();

        let mut listings = Vec::with_capacity(providers.len());
        for peer in providers {
            let key = DhtKey::file(peer, hash).to_string();
            match self.get_record(&key).await {
                Ok(value) if !is_tombstone(&value) => {
                    let id = if peer == local {
                        "Me".to_string()
                    } else {
                        peer.to_string()
                    };
                    listings.push(ProviderListing {
                        id,
                        cost: String::from_utf8_lossy(&value).into_owned(),
                    });
                }
                Ok(_) => tracing::debug!(%peer, hash = %hash, "provider withdrew file"),
                Err(e) => tracing::debug!(%peer, hash = %hash, error = %e, "no price record"),
            }
        }
        Ok(listings)
    }

    /// Price record plus provider advertisement.
    pub async fn publish_file(&self, hash: &str, cost: f64) -> Result<(), NetworkError> {
        let key = DhtKey::file(self.local_peer_id(), hash);
        self.put_record(&key.to_string(), format_price(cost).into_bytes())
            .await?;
        self.advertise(hash.trim(), true).await
    }

    /// Tombstone the price record and stop advertising.
    pub async fn unpublish_file(&self, hash: &str) -> Result<(), NetworkError> {
        let key = DhtKey::file(self.local_peer_id(), hash);
        self.put_record(&key.to_string(), TOMBSTONE.as_bytes().to_vec())
            .await?;
        self.advertise(hash.trim(), false).await
    }

    /// Publish this node's proxy descriptor and advertise its digest.
    pub async fn register_proxy(&self, registration: ProxyRegistration) -> Result<ProxyInfo, NetworkError> {
        let info = ProxyInfo {
            peer_id: self.local_peer_id().to_string(),
            name: registration.name,
            location: registration.location,
            ip_address: registration.ip_address,
            initial_fee: registration.initial_fee,
            price: registration.price,
            port: registration.port,
        };
        let json = serde_json::to_string(&info)?;
        let key = DhtKey::proxy(self.local_peer_id()).to_string();
        self.put_record(&key, json.clone().into_bytes()).await?;
        self.advertise(&json, true).await?;
        tracing::info!(name = %info.name, "registered as proxy");
        Ok(info)
    }

    /// Clear the proxy descriptor. Nothing is advertised.
    pub async fn deregister_proxy(&self) -> Result<(), NetworkError> {
        let key = DhtKey::proxy(self.local_peer_id()).to_string();
        self.put_record(&key, Vec::new()).await?;
        tracing::info!("deregistered as proxy");
        Ok(())
    }

    pub async fn get_proxy_info(&self, peer: &str) -> Result<Option<ProxyInfo>, NetworkError> {
        let key = DhtKey::proxy(peer).to_string();
        match self.get_record(&key).await {
            Ok(value) => Ok(ProxyInfo::from_record_value(&value)?),
            Err(NetworkError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn is_proxy(&self) -> Result<bool, NetworkError> {
        let me = self.local_peer_id().to_string();
        Ok(self.get_proxy_info(&me).await?.is_some())
    }

    /// Proxy descriptors of every peer we have been connected to.
    pub async fn list_proxies(&self) -> Vec<ProxyInfo> {
        let mut proxies = Vec::new();
        for peer in self.dht.known_peers() {
            match self.get_proxy_info(&peer.to_string()).await {
                Ok(Some(info)) => proxies.push(info),
                Ok(None) => {}
                Err(e) => tracing::debug!(%peer, error = %e, "proxy lookup failed"),
            }
        }
        proxies
    }

    pub async fn map_wallet_address(&self, address: &str) -> Result<(), NetworkError> {
        let key = DhtKey::wallet(self.local_peer_id()).to_string();
        self.put_record(&key, serde_json::to_vec(address)?).await
    }

    pub async fn get_wallet_address(&self, peer: &str) -> Result<Option<String>, NetworkError> {
        let key = DhtKey::wallet(peer).to_string();
        let value = match self.get_record(&key).await {
            Ok(value) => value,
            Err(NetworkError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if value.is_empty() || is_tombstone(&value) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&value)?))
    }

    /// Re-publish every locally stored file. Failures are logged per record
    /// and the replay continues.
    pub async fn provide_all_uploads(&self, store: &dyn MetadataStore) -> Result<ReplaySummary, NetworkError> {
        let mut summary = ReplaySummary::default();
        for record in store.fetch_all_file_records()? {
            match self.publish_file(&record.hash, record.cost).await {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(hash = %record.hash, error = %e, "failed to re-publish file");
                }
            }
        }
        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            "local uploads re-published"
        );
        Ok(summary)
    }
}
