//! # Groups
//!
//! Anonymity sets an identity can join by commitment. A group is a flat
//! member list persisted under its id; merkle inclusion proofs over the
//! list are built on demand with the fixed group tree geometry from
//! [`config`](crate::config), so a member can later prove membership to
//! the proof services without the wallet disclosing which member it is.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::{GROUP_TREE_ARITY, GROUP_TREE_DEPTH};
use crate::proof::{MerkleProof, MerkleProofArtifacts};
use crate::storage::{keys, SecureStorage, StorageError};
use crate::{Error, Result};

/// Member slots in a group tree: `arity ^ depth`.
const GROUP_TREE_CAPACITY: u64 = (GROUP_TREE_ARITY as u64).pow(GROUP_TREE_DEPTH);

/// Group membership and inclusion proofs.
pub struct GroupService {
    storage: Arc<dyn SecureStorage>,
    /// A group's member list is one value under one key; joins read,
    /// extend, and rewrite it and must not interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl GroupService {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn key(group_id: &str) -> String {
        keys::scoped(keys::GROUPS, group_id)
    }

    /// Append a commitment to the group's member list. Joining a group
    /// twice with the same commitment is refused loudly, since a
    /// duplicated leaf would corrupt later inclusion proofs; so is a
    /// join past the tree's leaf capacity, which could never prove.
    pub async fn join(&self, group_id: &str, commitment: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut members = self.members(group_id).await?;
        if members.iter().any(|m| m == commitment) {
            return Err(Error::Protocol(format!(
                "commitment is already a member of group {group_id}"
            )));
        }
        if members.len() as u64 >= GROUP_TREE_CAPACITY {
            return Err(Error::Protocol(format!(
                "group {group_id} is full ({GROUP_TREE_CAPACITY} members)"
            )));
        }
        members.push(commitment.to_string());
        debug!(group_id, size = members.len(), "group member added");

        let value = serde_json::to_value(&members)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.set(&Self::key(group_id), value).await?;
        Ok(())
    }

    /// The group's member commitments, join order. Unknown groups are
    /// simply empty.
    pub async fn members(&self, group_id: &str) -> Result<Vec<String>> {
        match self.storage.get(&Self::key(group_id)).await? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                StorageError::Corrupt {
                    key: Self::key(group_id),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Build an inclusion proof for `commitment` over the group's
    /// current member list.
    pub async fn merkle_proof(&self, group_id: &str, commitment: &str) -> Result<MerkleProof> {
        let members = self.members(group_id).await?;
        let artifacts = MerkleProofArtifacts {
            leaves: members,
            depth: GROUP_TREE_DEPTH,
            leaves_per_node: GROUP_TREE_ARITY,
        };
        let proof = crate::proof::build_proof(&artifacts, commitment)?;
        Ok(proof)
    }

    /// `merkle_proof` as a wire value.
    pub async fn merkle_proof_value(&self, group_id: &str, commitment: &str) -> Result<Value> {
        let proof = self.merkle_proof(group_id, commitment).await?;
        serde_json::to_value(proof)
            .map_err(|e| StorageError::Serialization(e.to_string()).into())
    }
}
