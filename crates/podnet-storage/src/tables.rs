//! redb schema and database handle
//!
//! Four byte-keyed tables hold the federation state. Values are postcard
//! encoded; request keys are big-endian request identities so table order
//! is queue order.

use std::path::{Path, PathBuf};

use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition,
    TableHandle, WriteTransaction,
};
use tracing::{debug, info, instrument};

use podnet_core::StorageError;

pub(crate) type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// request id (u64 big-endian) -> request row
pub(crate) const POOL_REQUESTS: Table = TableDefinition::new("pool_requests");

/// pod id -> pod
pub(crate) const PODS: Table = TableDefinition::new("pods");

/// content record id -> content record
pub(crate) const CONTENT: Table = TableDefinition::new("content");

/// counter name -> u64 big-endian
pub(crate) const COUNTERS: Table = TableDefinition::new("counters");

const ALL_TABLES: [Table; 4] = [POOL_REQUESTS, PODS, CONTENT, COUNTERS];

/// Last allocated request identity
pub(crate) const LAST_REQUEST_ID: &[u8] = b"last_request_id";

/// Where the database lives
#[derive(Debug, Clone)]
pub struct RedbStorageConfig {
    /// Path to the database file; parent directories are created on open
    pub db_path: PathBuf,
}

impl Default for RedbStorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/podnet.redb"),
        }
    }
}

impl RedbStorageConfig {
    /// Use a specific database file
    pub fn with_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::database(e.to_string())
}

/// An open federation database
pub struct RedbStorage {
    db: Database,
    path: PathBuf,
}

impl RedbStorage {
    /// Open or create the database and its tables
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(|e| StorageError::io(e.to_string()))?;
        let storage = Self {
            db,
            path: config.db_path,
        };

        storage.write(|txn| {
            for table in ALL_TABLES {
                txn.open_table(table).map_err(db_err)?;
            }
            Ok(())
        })?;

        info!("Opened federation database");
        Ok(storage)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` in a write transaction, committing only if it succeeds
    ///
    /// redb serializes write transactions, so `f` observes and mutates a
    /// consistent snapshot. An error drops the transaction, which aborts it.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        let out = f(&txn)?;
        txn.commit().map_err(db_err)?;
        Ok(out)
    }

    /// Run `f` in a read transaction
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        f(&txn)
    }

    /// Copy every entry of a table, in key order
    pub(crate) fn entries(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.read(|txn| {
            let table = txn.open_table(table).map_err(db_err)?;
            let mut entries = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                entries.push((key.value().to_vec(), value.value().to_vec()));
            }
            Ok(entries)
        })
    }

    /// Number of entries in a table
    pub fn len(&self, table_name: &str) -> Result<u64, StorageError> {
        let table = ALL_TABLES
            .into_iter()
            .find(|t| t.name() == table_name)
            .ok_or_else(|| StorageError::database(format!("no table named {table_name}")))?;
        let len = self.read(|txn| txn.open_table(table).map_err(db_err)?.len().map_err(db_err))?;
        debug!(table = table_name, len, "Counted table entries");
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (RedbStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage =
            RedbStorage::open(RedbStorageConfig::with_path(temp_dir.path().join("nested/db.redb")))
                .unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_open_creates_tables() {
        let (storage, _temp) = open();
        assert!(storage.path().ends_with("nested/db.redb"));
        for name in ["pool_requests", "pods", "content", "counters"] {
            assert_eq!(storage.len(name).unwrap(), 0);
        }
        assert!(storage.len("videos").is_err());
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let (storage, _temp) = open();

        let result: Result<(), StorageError> = storage.write(|txn| {
            txn.open_table(PODS)
                .map_err(db_err)?
                .insert(b"pod-a".as_slice(), b"value".as_slice())
                .map_err(db_err)?;
            Err(StorageError::corrupted("abort"))
        });
        assert!(result.is_err());
        assert_eq!(storage.len("pods").unwrap(), 0);
    }

    #[test]
    fn test_entries_are_key_ordered() {
        let (storage, _temp) = open();
        storage
            .write(|txn| {
                let mut table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;
                for (id, value) in [(2u64, "second"), (1, "first"), (300, "third")] {
                    table
                        .insert(id.to_be_bytes().as_slice(), value.as_bytes())
                        .map_err(db_err)?;
                }
                Ok(())
            })
            .unwrap();

        let values: Vec<_> = storage
            .entries(POOL_REQUESTS)
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }
}
