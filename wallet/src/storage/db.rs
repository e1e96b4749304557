//! # Sled-Backed Secure Storage
//!
//! The durable storage backend, built on sled's embedded key-value store.
//! One tree, string keys, JSON-encoded values. sled gives us the per-key
//! atomicity the [`SecureStorage`](super::SecureStorage) contract demands:
//! an `insert` is a single atomic operation, and concurrent readers see
//! either the old value or the new one, never a torn write.
//!
//! Keys arrive pre-namespaced (see [`super::keys`]), so a single tree is
//! enough — the namespaces partition the keyspace lexically.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::{SecureStorage, StorageError};

/// Durable secure storage over a sled database.
///
/// Cheap to clone; all clones share the same underlying tree. Safe to use
/// from many tasks concurrently without external locking.
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStorage {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is discarded on drop.
    ///
    /// Ideal for tests — no filesystem residue, no cleanup.
    pub fn open_temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree("wallet")?;
        Ok(Self { db, tree })
    }

    /// Block until all pending writes are durable on disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SecureStorage for SledStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(&value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }
}
