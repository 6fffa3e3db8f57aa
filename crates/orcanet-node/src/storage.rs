//! RocksDB metadata store for the files this node hosts.

use orcanet_core::{CoreError, FileRecord, MetadataStore};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::Mutex;

/// Column family holding `hash → FileRecord` as JSON.
const CF_FILES: &str = "files";

/// RocksDB-backed [`MetadataStore`].
pub struct Storage {
    db: DB,
    /// Serializes check-then-insert in `store_file_record`.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_FILES, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn files_cf(&self) -> Result<&rocksdb::ColumnFamily, CoreError> {
        self.db
            .cf_handle(CF_FILES)
            .ok_or_else(|| CoreError::Storage(format!("column family '{}' not found", CF_FILES)))
    }
}

fn storage_err(e: rocksdb::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

impl MetadataStore for Storage {
    fn get_file_record(&self, hash: &str) -> Result<Option<FileRecord>, CoreError> {
        let cf = self.files_cf()?;
        match self.db.get_cf(cf, hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store_file_record(&self, record: FileRecord) -> Result<(), CoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CoreError::Storage("write lock poisoned".into()))?;
        let cf = self.files_cf()?;
        if self
            .db
            .get_cf(cf, record.hash.as_bytes())
            .map_err(storage_err)?
            .is_some()
        {
            return Err(CoreError::DuplicateRecord(record.hash));
        }
        let value = serde_json::to_vec(&record)?;
        self.db
            .put_cf(cf, record.hash.as_bytes(), value)
            .map_err(storage_err)?;
        tracing::debug!(hash = %record.hash, filename = %record.filename, "file record stored");
        Ok(())
    }

    fn delete_file_record(&self, hash: &str) -> Result<(), CoreError> {
        let cf = self.files_cf()?;
        self.db.delete_cf(cf, hash.as_bytes()).map_err(storage_err)
    }

    fn fetch_all_file_records(&self) -> Result<Vec<FileRecord>, CoreError> {
        let cf = self.files_cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            match serde_json::from_slice::<FileRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "skipping unreadable file record"
                ),
            }
        }
        Ok(records)
    }
}
