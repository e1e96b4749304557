//! # Merkle Proof Sources
//!
//! A proof request names its membership evidence in exactly one of three
//! ways: a precomputed inclusion proof, raw artifacts (leaves + depth +
//! branching factor) to build one from, or an external storage address to
//! fetch one from. [`validate`] enforces well-formedness before anything
//! touches the data; [`build_proof`] turns artifacts into a concrete proof
//! using a domain-separated BLAKE3 tree; [`MerkleResolver`] is the seam
//! through which a service obtains the final proof whichever form arrived.
//!
//! ## Validation order
//!
//! Deterministic error reporting matters more than cleverness: ambiguous
//! sources are rejected first, then artifacts are checked depth → leaves →
//! leaves-per-node, in that order, always.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Merkle-source validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The source carried no proof, no artifacts, and no address.
    #[error("no merkle proof source provided")]
    NoProofProvided,

    /// More than one source variant was populated.
    #[error("ambiguous merkle proof source: provide exactly one of proof, artifacts, or storage address")]
    MultipleProofSources,

    /// Artifact depth must be a positive integer.
    #[error("invalid merkle tree depth: {0}")]
    InvalidDepth(u32),

    /// Artifacts must carry at least one leaf.
    #[error("merkle proof artifacts contain no leaves")]
    InvalidLeaves,

    /// Branching factor must be positive and at most
    /// [`MAX_TREE_ARITY`](crate::config::MAX_TREE_ARITY).
    #[error("invalid merkle leaves per node: {0}")]
    InvalidLeavesPerNode(u32),

    /// The identity commitment is not among the artifact leaves.
    #[error("leaf {0} is not present in the merkle artifacts")]
    LeafNotFound(String),

    /// Structurally valid fields that cannot form a tree (depth over the
    /// ceiling, more leaves than the tree can hold, ...).
    #[error("malformed merkle artifacts: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A concrete merkle inclusion proof.
///
/// `siblings[i]` holds the *other* children of the node crossed at level
/// `i`, and `path_indices[i]` is the position of our branch within that
/// node. Enough to recompute the root from the leaf and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Hex root of the tree.
    pub root: String,
    /// Hex hash of the proven leaf.
    pub leaf: String,
    /// Sibling hashes, one group per level, leaf to root.
    pub siblings: Vec<Vec<String>>,
    /// Our branch's index within each level's node.
    pub path_indices: Vec<u32>,
}

/// Raw data sufficient to construct an inclusion proof locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProofArtifacts {
    /// Ordered member values (pre-hash).
    pub leaves: Vec<String>,
    /// Tree depth. Must be positive.
    pub depth: u32,
    /// Branching factor. Must be positive.
    pub leaves_per_node: u32,
}

/// The three ways a request can point at its membership evidence.
/// Exactly one field may be populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProofSource {
    /// A precomputed proof, trusted as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof: Option<MerkleProof>,
    /// Artifacts to build a proof from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_proof_artifacts: Option<MerkleProofArtifacts>,
    /// An external reference to fetch a proof from. Resolution is
    /// deferred to the fetch collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_storage_address: Option<String>,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Check that a proof source is well-formed, returning it unchanged.
///
/// Precomputed proofs and storage addresses pass through untouched;
/// artifacts are checked field by field in the documented order.
pub fn validate(source: &MerkleProofSource) -> Result<&MerkleProofSource> {
    let populated = usize::from(source.merkle_proof.is_some())
        + usize::from(source.merkle_proof_artifacts.is_some())
        + usize::from(source.merkle_storage_address.is_some());
    if populated > 1 {
        return Err(ValidationError::MultipleProofSources.into());
    }

    if source.merkle_proof.is_some() {
        return Ok(source);
    }

    if let Some(artifacts) = &source.merkle_proof_artifacts {
        if artifacts.depth == 0 {
            return Err(ValidationError::InvalidDepth(artifacts.depth).into());
        }
        if artifacts.leaves.is_empty() {
            return Err(ValidationError::InvalidLeaves.into());
        }
        if artifacts.leaves_per_node == 0 || artifacts.leaves_per_node > config::MAX_TREE_ARITY {
            return Err(ValidationError::InvalidLeavesPerNode(artifacts.leaves_per_node).into());
        }
        return Ok(source);
    }

    if source.merkle_storage_address.is_some() {
        return Ok(source);
    }

    Err(ValidationError::NoProofProvided.into())
}

// ---------------------------------------------------------------------------
// Tree Construction
// ---------------------------------------------------------------------------

/// Hash a leaf value with the leaf domain tag.
pub fn hash_leaf(value: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config::MERKLE_LEAF_DOMAIN);
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Hash an internal node from its ordered children (hex strings).
fn hash_node(children: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config::MERKLE_NODE_DOMAIN);
    for child in children {
        hasher.update(child.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Build an inclusion proof for `leaf` from raw artifacts.
///
/// The tree is padded with per-level empty hashes up to
/// `leaves_per_node ^ depth` slots, so two trees with the same real
/// leaves and the same shape always share a root.
pub fn build_proof(
    artifacts: &MerkleProofArtifacts,
    leaf: &str,
) -> std::result::Result<MerkleProof, ValidationError> {
    if artifacts.depth == 0 || artifacts.depth > config::MAX_TREE_DEPTH {
        return Err(ValidationError::InvalidDepth(artifacts.depth));
    }
    if artifacts.leaves.is_empty() {
        return Err(ValidationError::InvalidLeaves);
    }
    if artifacts.leaves_per_node == 0 || artifacts.leaves_per_node > config::MAX_TREE_ARITY {
        return Err(ValidationError::InvalidLeavesPerNode(artifacts.leaves_per_node));
    }

    let arity = artifacts.leaves_per_node as usize;
    let capacity = (arity as u64)
        .checked_pow(artifacts.depth)
        .ok_or_else(|| ValidationError::Malformed("tree capacity overflows".to_string()))?;
    if artifacts.leaves.len() as u64 > capacity {
        return Err(ValidationError::Malformed(format!(
            "{} leaves exceed capacity {} for depth {}",
            artifacts.leaves.len(),
            capacity,
            artifacts.depth
        )));
    }

    let mut index = artifacts
        .leaves
        .iter()
        .position(|candidate| candidate == leaf)
        .ok_or_else(|| ValidationError::LeafNotFound(leaf.to_string()))?;

    // Only real nodes are materialized; absent slots at each level are the
    // level's empty hash.
    let mut level: Vec<String> = artifacts.leaves.iter().map(|l| hash_leaf(l)).collect();
    let mut empty = hash_leaf("");
    let leaf_hash = level[index].clone();

    let mut siblings = Vec::with_capacity(artifacts.depth as usize);
    let mut path_indices = Vec::with_capacity(artifacts.depth as usize);

    for _ in 0..artifacts.depth {
        let position = index % arity;
        let chunk_start = index - position;

        let mut group = Vec::with_capacity(arity - 1);
        for slot in 0..arity {
            if slot == position {
                continue;
            }
            let value = level
                .get(chunk_start + slot)
                .cloned()
                .unwrap_or_else(|| empty.clone());
            group.push(value);
        }
        siblings.push(group);
        path_indices.push(position as u32);

        let parents = level.len().div_ceil(arity);
        let mut next = Vec::with_capacity(parents);
        for parent in 0..parents {
            let mut children = Vec::with_capacity(arity);
            for slot in 0..arity {
                let value = level
                    .get(parent * arity + slot)
                    .cloned()
                    .unwrap_or_else(|| empty.clone());
                children.push(value);
            }
            next.push(hash_node(&children));
        }

        empty = hash_node(&vec![empty; arity]);
        level = next;
        index /= arity;
    }

    let root = level.first().cloned().unwrap_or(empty);

    Ok(MerkleProof {
        root,
        leaf: leaf_hash,
        siblings,
        path_indices,
    })
}

/// Recompute the root from a proof and compare. True when the proof is
/// internally consistent.
pub fn verify_proof(proof: &MerkleProof) -> bool {
    let mut current = proof.leaf.clone();
    if proof.siblings.len() != proof.path_indices.len() {
        return false;
    }

    for (group, &position) in proof.siblings.iter().zip(&proof.path_indices) {
        let arity = group.len() + 1;
        if position as usize >= arity {
            return false;
        }
        let mut children = Vec::with_capacity(arity);
        let mut others = group.iter();
        for slot in 0..arity {
            if slot == position as usize {
                children.push(current.clone());
            } else {
                // Length checked above: arity - 1 entries exist.
                children.push(others.next().cloned().unwrap_or_default());
            }
        }
        current = hash_node(&children);
    }

    current == proof.root
}

// ---------------------------------------------------------------------------
// Resolver Seam
// ---------------------------------------------------------------------------

/// Turns a validated source into a concrete proof, whichever of the three
/// forms arrived. Fetching from a storage address belongs to an external
/// collaborator, so it lives behind this trait too.
#[async_trait]
pub trait MerkleResolver: Send + Sync {
    /// Produce the inclusion proof for `leaf` described by `source`.
    async fn resolve(&self, source: &MerkleProofSource, leaf: &str) -> Result<MerkleProof>;
}

/// Resolver for the two local forms: precomputed proofs pass through,
/// artifacts are built in place. Storage addresses need a fetch
/// collaborator this resolver does not have.
#[derive(Debug, Default)]
pub struct LocalResolver;

#[async_trait]
impl MerkleResolver for LocalResolver {
    async fn resolve(&self, source: &MerkleProofSource, leaf: &str) -> Result<MerkleProof> {
        if let Some(proof) = &source.merkle_proof {
            return Ok(proof.clone());
        }
        if let Some(artifacts) = &source.merkle_proof_artifacts {
            return Ok(build_proof(artifacts, leaf)?);
        }
        if let Some(address) = &source.merkle_storage_address {
            return Err(Error::ProofGeneration(format!(
                "no fetcher configured for merkle storage address {address}"
            )));
        }
        Err(ValidationError::NoProofProvided.into())
    }
}
