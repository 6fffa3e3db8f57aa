//! Core types shared by every OrcaNet crate.
//!
//! - [`keys`]: the `/orcanet/...` DHT key namespace and tombstone handling
//! - [`types`]: records exchanged through the DHT and the HTTP API
//! - [`store`]: the local file metadata store interface

pub mod error;
pub mod keys;
pub mod store;
pub mod types;

pub use error::CoreError;
pub use keys::{DhtKey, NAMESPACE, TOMBSTONE};
pub use store::{MemoryMetadataStore, MetadataStore};
pub use types::{FileRecord, KnownPeer, KnownPeers, ProviderListing, ProxyInfo};
