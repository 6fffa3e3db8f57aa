//! DHT record validation.
//!
//! Kademlia is configured to hand every inbound record to the node instead of
//! storing it directly; the node runs it through a [`RecordValidator`] first.
//! The same validator picks among competing values on lookup.
//!
//! The stock OrcaNet validator is permissive: any value under `/orcanet/` is
//! accepted, including writes under another peer's sub-path. Only the
//! namespace is checked.

use std::collections::HashMap;
use std::sync::Arc;

use orcanet_core::keys::namespace_of;
use orcanet_core::NAMESPACE;

use crate::error::NetworkError;

/// Accepts or rejects records and chooses between competing values.
pub trait RecordValidator: Send + Sync {
    /// Check a record before it is stored or published.
    fn validate(&self, key: &str, value: &[u8]) -> Result<(), NetworkError>;

    /// Index of the best value among those found for `key`.
    fn select(&self, key: &str, values: &[Vec<u8>]) -> Result<usize, NetworkError>;
}

/// Accepts everything; the first value seen wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator;

impl RecordValidator for PermissiveValidator {
    fn validate(&self, _key: &str, _value: &[u8]) -> Result<(), NetworkError> {
        Ok(())
    }

    fn select(&self, key: &str, values: &[Vec<u8>]) -> Result<usize, NetworkError> {
        if values.is_empty() {
            return Err(NetworkError::NotFound(key.to_string()));
        }
        Ok(0)
    }
}

/// Dispatches on the first key segment (`/orcanet/...` → `orcanet`).
#[derive(Clone, Default)]
pub struct NamespacedValidator {
    validators: HashMap<String, Arc<dyn RecordValidator>>,
}

impl NamespacedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator used by OrcaNet nodes: `orcanet` → [`PermissiveValidator`].
    pub fn orcanet() -> Self {
        Self::new().with_namespace(NAMESPACE, PermissiveValidator)
    }

    pub fn with_namespace(
        mut self,
        namespace: impl Into<String>,
        validator: impl RecordValidator + 'static,
    ) -> Self {
        self.validators.insert(namespace.into(), Arc::new(validator));
        self
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    fn lookup(&self, key: &str) -> Result<&Arc<dyn RecordValidator>, NetworkError> {
        let ns = namespace_of(key)
            .ok_or_else(|| NetworkError::InvalidRecord(format!("malformed key '{}'", key)))?;
        self.validators
            .get(ns)
            .ok_or_else(|| NetworkError::InvalidRecord(format!("unknown namespace '{}'", ns)))
    }
}

impl std::fmt::Debug for NamespacedValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespacedValidator")
            .field("namespaces", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RecordValidator for NamespacedValidator {
    fn validate(&self, key: &str, value: &[u8]) -> Result<(), NetworkError> {
        self.lookup(key)?.validate(key, value)
    }

    fn select(&self, key: &str, values: &[Vec<u8>]) -> Result<usize, NetworkError> {
        self.lookup(key)?.select(key, values)
    }
}

/// Decode a raw Kademlia key for validation.
pub fn key_str(key: &libp2p::kad::RecordKey) -> Result<&str, NetworkError> {
    std::str::from_utf8(key.as_ref())
        .map_err(|_| NetworkError::InvalidRecord("key is not valid UTF-8".into()))
}
