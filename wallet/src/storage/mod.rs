//! # Secure Storage
//!
//! Durable, keyed persistence for everything the wallet must remember:
//! identities, host connections, history, credentials, group memberships.
//! Values are opaque JSON — callers own their schemas, storage owns bytes.
//!
//! ## Contract
//!
//! - `get` / `set` / `clear` on string keys, async.
//! - Writes to a key are atomic from the caller's perspective: no reader
//!   ever observes a partially written value.
//! - No cross-key transactions. Each logical store owns a disjoint key
//!   namespace (see [`keys`]) and must not assume atomicity across them.
//!
//! Two implementations ship with the crate: [`db::SledStorage`] for real
//! durability and [`memory::MemoryStorage`] for tests and ephemeral runs.

pub mod db;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use db::SledStorage;
pub use memory::MemoryStorage;

// ---------------------------------------------------------------------------
// Key Namespaces
// ---------------------------------------------------------------------------

/// Fixed key prefixes, one per logical store. These never change once
/// records exist under them.
pub mod keys {
    /// Serialized identities, keyed by commitment.
    pub const IDENTITIES: &str = "identities";

    /// Per-host wallet connection records.
    pub const CONNECTIONS: &str = "connections";

    /// The append-only operation history log.
    pub const HISTORY: &str = "history";

    /// Stored verifiable credentials, keyed by credential id.
    pub const CREDENTIALS: &str = "credentials";

    /// Group membership sets, keyed by group id.
    pub const GROUPS: &str = "groups";

    /// Joins a namespace and a record id into a full storage key.
    pub fn scoped(namespace: &str, id: &str) -> String {
        format!("{namespace}/{id}")
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The embedded database failed underneath us.
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    /// A stored value could not be encoded or decoded as JSON.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A record exists but does not have the shape its owner expects.
    /// Fatal to the single operation that hit it, nothing more.
    #[error("corrupt record under {key}: {reason}")]
    Corrupt {
        /// The full storage key of the offending record.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// SecureStorage Trait
// ---------------------------------------------------------------------------

/// Opaque keyed persistence.
///
/// Implementations must serialize writes per key — a `set` completes
/// before the next `get`/`set` on the same key observes anything.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read the value under `key`, or `None` if the key has never been
    /// written (or was cleared).
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Atomically replace the value under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove the value under `key`. Clearing an absent key is a no-op.
    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_keys_compose() {
        assert_eq!(keys::scoped(keys::IDENTITIES, "0xabc"), "identities/0xabc");
    }

    #[test]
    fn namespaces_are_disjoint() {
        let all = [
            keys::IDENTITIES,
            keys::CONNECTIONS,
            keys::HISTORY,
            keys::CREDENTIALS,
            keys::GROUPS,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in all.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
