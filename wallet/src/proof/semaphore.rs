//! # Semaphore Proof Service
//!
//! Orchestrates a Semaphore proof: validate the merkle source, resolve it
//! to a concrete inclusion proof for the identity's commitment, assemble
//! the prover input, and run the prover on its own task. The service holds
//! no request state — a failed run leaves nothing behind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::merkle::{self, MerkleProofSource, MerkleResolver};
use super::prover::{Prover, ProverInput};
use crate::identity::ZkIdentity;
use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A page's request for a Semaphore proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreProofRequest {
    /// Public input binding the proof to a context.
    pub external_nullifier: String,
    /// Public input binding the proof to a message.
    pub signal: String,
    /// Path to the compiled Semaphore circuit.
    pub circuit_file_path: String,
    /// Path to the proving key.
    pub zkey_file_path: String,
    /// Verification key handed back alongside the proof consumer.
    pub verification_key: String,
    /// Membership evidence, in exactly one of its three forms.
    #[serde(flatten)]
    pub proof_source: MerkleProofSource,
}

/// The prover's output, wrapped. The inner value is verbatim prover
/// output — this crate never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemaphoreProof {
    /// The full proof blob.
    pub full_proof: Value,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Generates Semaphore proofs for held identities.
pub struct SemaphoreProofService {
    prover: Arc<dyn Prover>,
    resolver: Arc<dyn MerkleResolver>,
}

impl SemaphoreProofService {
    /// Build a service over a prover and a merkle resolver.
    pub fn new(prover: Arc<dyn Prover>, resolver: Arc<dyn MerkleResolver>) -> Self {
        Self { prover, resolver }
    }

    /// Generate a proof that `identity` is a member of the requested set
    /// and said `signal` in the `external_nullifier` context.
    ///
    /// The prover call is spawned so concurrent dispatches keep flowing
    /// while it grinds; its result (or its failure) is the only thing
    /// this service retains, and only until it returns.
    pub async fn gen_proof(
        &self,
        identity: &ZkIdentity,
        request: &SemaphoreProofRequest,
    ) -> Result<SemaphoreProof> {
        merkle::validate(&request.proof_source)?;

        let commitment = identity.commitment();
        let merkle_proof = self
            .resolver
            .resolve(&request.proof_source, &commitment)
            .await?;
        debug!(root = %merkle_proof.root, "merkle source resolved");

        let input = ProverInput {
            identity_commitment: commitment,
            signal: request.signal.clone(),
            external_nullifier: request.external_nullifier.clone(),
            merkle_proof,
            circuit_file_path: request.circuit_file_path.clone(),
            zkey_file_path: request.zkey_file_path.clone(),
            rln_identifier: None,
        };

        let prover = Arc::clone(&self.prover);
        let full_proof = tokio::spawn(async move { prover.prove(input).await })
            .await
            .map_err(|e| Error::ProofGeneration(format!("prover task failed: {e}")))?
            .map_err(|e| Error::ProofGeneration(e.to_string()))?;

        info!("semaphore proof generated");
        Ok(SemaphoreProof { full_proof })
    }
}
