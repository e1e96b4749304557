//! # RLN Proof Service
//!
//! Rate-Limiting Nullifier proofs follow the exact shape of the Semaphore
//! service with one extra public input, the `rln_identifier`, and a richer
//! output: the prover reports the snark proof together with the epoch it
//! was generated for. Both come back verbatim.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::merkle::{self, MerkleProofSource, MerkleResolver};
use super::prover::{Prover, ProverInput};
use crate::identity::ZkIdentity;
use crate::{Error, Result};

/// A page's request for an RLN proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlnProofRequest {
    /// Public input binding the proof to a context.
    pub external_nullifier: String,
    /// Public input binding the proof to a message.
    pub signal: String,
    /// Path to the compiled RLN circuit.
    pub circuit_file_path: String,
    /// Path to the proving key.
    pub zkey_file_path: String,
    /// Verification key handed to the proof consumer.
    pub verification_key: String,
    /// The rate-limit context this proof counts against.
    pub rln_identifier: String,
    /// Membership evidence, in exactly one of its three forms.
    #[serde(flatten)]
    pub proof_source: MerkleProofSource,
}

/// The prover's RLN output, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlnProof {
    /// The snark proof blob.
    pub snark_proof: Value,
    /// The epoch the proof was generated for.
    pub epoch: String,
    /// Echo of the rate-limit context identifier.
    pub rln_identifier: String,
}

/// Generates RLN proofs for held identities.
pub struct RlnProofService {
    prover: Arc<dyn Prover>,
    resolver: Arc<dyn MerkleResolver>,
}

impl RlnProofService {
    /// Build a service over a prover and a merkle resolver.
    pub fn new(prover: Arc<dyn Prover>, resolver: Arc<dyn MerkleResolver>) -> Self {
        Self { prover, resolver }
    }

    /// Generate an RLN proof. Same pipeline as Semaphore: validate,
    /// resolve, prove on a spawned task, return verbatim.
    pub async fn gen_proof(
        &self,
        identity: &ZkIdentity,
        request: &RlnProofRequest,
    ) -> Result<RlnProof> {
        merkle::validate(&request.proof_source)?;

        let commitment = identity.commitment();
        let merkle_proof = self
            .resolver
            .resolve(&request.proof_source, &commitment)
            .await?;
        debug!(root = %merkle_proof.root, rln_identifier = %request.rln_identifier, "merkle source resolved");

        let input = ProverInput {
            identity_commitment: commitment,
            signal: request.signal.clone(),
            external_nullifier: request.external_nullifier.clone(),
            merkle_proof,
            circuit_file_path: request.circuit_file_path.clone(),
            zkey_file_path: request.zkey_file_path.clone(),
            rln_identifier: Some(request.rln_identifier.clone()),
        };

        let prover = Arc::clone(&self.prover);
        let output = tokio::spawn(async move { prover.prove(input).await })
            .await
            .map_err(|e| Error::ProofGeneration(format!("prover task failed: {e}")))?
            .map_err(|e| Error::ProofGeneration(e.to_string()))?;

        let proof: RlnProof = serde_json::from_value(output)
            .map_err(|e| Error::ProofGeneration(format!("prover output malformed: {e}")))?;

        info!(epoch = %proof.epoch, "rln proof generated");
        Ok(proof)
    }
}
