//! The operation history.
//!
//! A capped, persisted list of consent-bearing operations, newest last.
//! Strictly an audit surface for the user; nothing reads it back for
//! decisions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::HISTORY_CAPACITY;
use crate::rpc::RpcMethod;
use crate::storage::{keys, SecureStorage, StorageError};
use crate::Result;

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// Wire name of the operation.
    pub operation: String,
    /// The host on whose behalf it ran, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only capped log under the history storage key.
pub struct HistoryLog {
    storage: Arc<dyn SecureStorage>,
    /// The log is one value under one key; every write is a read-modify-
    /// write of the whole list and must not interleave with another.
    write_lock: tokio::sync::Mutex<()>,
}

impl HistoryLog {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Record an operation. The oldest entries fall off once the cap
    /// is reached.
    pub async fn append(&self, operation: RpcMethod, host: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.entries().await?;
        entries.push(HistoryEntry {
            id: Uuid::new_v4().to_string(),
            operation: operation.as_str().to_string(),
            host: host.map(str::to_string),
            created_at: Utc::now(),
        });
        if entries.len() > HISTORY_CAPACITY {
            let excess = entries.len() - HISTORY_CAPACITY;
            entries.drain(..excess);
        }
        debug!(%operation, size = entries.len(), "history appended");

        let value = serde_json::to_value(&entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.set(keys::HISTORY, value).await?;
        Ok(())
    }

    /// Every recorded entry, oldest first.
    pub async fn entries(&self) -> Result<Vec<HistoryEntry>> {
        match self.storage.get(keys::HISTORY).await? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                StorageError::Corrupt {
                    key: keys::HISTORY.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Drop the whole log.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.clear(keys::HISTORY).await?;
        Ok(())
    }
}
