//! In-memory secure storage for tests and ephemeral sessions.
//!
//! A `RwLock<HashMap>` behind the same [`SecureStorage`](super::SecureStorage)
//! trait as the sled backend. The write lock serializes mutations per map,
//! which trivially satisfies the per-key atomicity contract.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{SecureStorage, StorageError};

/// Volatile storage. Everything is gone on drop — by design.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys. Test convenience.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }
}
