//! # Identity Store
//!
//! Persistence for identities over [`SecureStorage`], keyed by commitment
//! under the `identities/` namespace. This store owns that namespace
//! exclusively — no other component writes identity keys.
//!
//! Two rules with teeth:
//!
//! - **No silent overwrites.** Inserting a commitment that already exists
//!   is an error. An identity leaves the store only through an explicit
//!   `delete`.
//! - **Corruption is contained.** A record that no longer deserializes
//!   fails the single operation that touched it; every other identity and
//!   the process as a whole are unaffected.

use std::sync::Arc;

use tracing::info;

use super::zk_identity::ZkIdentity;
use super::IdentityError;
use crate::storage::{keys, SecureStorage, StorageError};
use crate::{Error, Result};

/// Identity persistence over secure storage.
pub struct IdentityStore {
    storage: Arc<dyn SecureStorage>,
}

impl IdentityStore {
    /// Create a store over the given storage backend.
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    fn key(commitment: &str) -> String {
        keys::scoped(keys::IDENTITIES, commitment)
    }

    /// Persist a new identity. Fails with
    /// [`IdentityError::DuplicateCommitment`] if one already exists under
    /// the same commitment.
    pub async fn insert(&self, identity: &ZkIdentity) -> Result<String> {
        let commitment = identity.commitment();
        let key = Self::key(&commitment);

        if self.storage.get(&key).await?.is_some() {
            return Err(IdentityError::DuplicateCommitment(commitment).into());
        }

        self.storage
            .set(&key, serde_json::Value::String(identity.serialize()))
            .await?;
        info!(commitment = %commitment, "identity stored");
        Ok(commitment)
    }

    /// Load the identity stored under `commitment`, if any.
    pub async fn get(&self, commitment: &str) -> Result<Option<ZkIdentity>> {
        let key = Self::key(commitment);
        let Some(value) = self.storage.get(&key).await? else {
            return Ok(None);
        };

        let raw = value.as_str().ok_or_else(|| {
            Error::Storage(StorageError::Corrupt {
                key: key.clone(),
                reason: "identity record is not a JSON string".to_string(),
            })
        })?;

        Ok(Some(ZkIdentity::deserialize(raw)?))
    }

    /// Load the identity stored under `commitment`, or fail with
    /// [`IdentityError::NotFound`].
    pub async fn require(&self, commitment: &str) -> Result<ZkIdentity> {
        self.get(commitment)
            .await?
            .ok_or_else(|| IdentityError::NotFound(commitment.to_string()).into())
    }

    /// Explicitly destroy the identity under `commitment`. The only way
    /// an identity ever leaves the store.
    pub async fn delete(&self, commitment: &str) -> Result<()> {
        let key = Self::key(commitment);
        if self.storage.get(&key).await?.is_none() {
            return Err(IdentityError::NotFound(commitment.to_string()).into());
        }
        self.storage.clear(&key).await?;
        info!(commitment = %commitment, "identity deleted");
        Ok(())
    }
}
