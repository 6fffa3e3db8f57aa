//! Local file metadata store.
//!
//! The store is the authoritative list of files this node serves; the DHT is a
//! cache rebuilt from it on every start.

use dashmap::DashMap;

use crate::error::CoreError;
use crate::types::FileRecord;

/// Persistence for the files this node hosts.
pub trait MetadataStore: Send + Sync {
    /// Look up a record by content hash.
    fn get_file_record(&self, hash: &str) -> Result<Option<FileRecord>, CoreError>;

    /// Insert a record. Fails with `DuplicateRecord` when the hash is present.
    fn store_file_record(&self, record: FileRecord) -> Result<(), CoreError>;

    /// Remove a record. Removing an absent hash is not an error.
    fn delete_file_record(&self, hash: &str) -> Result<(), CoreError>;

    /// Every record in the store.
    fn fetch_all_file_records(&self) -> Result<Vec<FileRecord>, CoreError>;
}

/// In-process store, used by tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: DashMap<String, FileRecord>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get_file_record(&self, hash: &str) -> Result<Option<FileRecord>, CoreError> {
        Ok(self.records.get(hash).map(|r| r.value().clone()))
    }

    fn store_file_record(&self, record: FileRecord) -> Result<(), CoreError> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(record.hash.clone()) {
            Entry::Occupied(_) => Err(CoreError::DuplicateRecord(record.hash)),
            Entry::Vacant(slot) => {
                tracing::debug!(hash = %record.hash, filename = %record.filename, "file record stored");
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn delete_file_record(&self, hash: &str) -> Result<(), CoreError> {
        self.records.remove(hash);
        Ok(())
    }

    fn fetch_all_file_records(&self) -> Result<Vec<FileRecord>, CoreError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}
