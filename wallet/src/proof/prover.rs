//! # The Opaque Prover
//!
//! This crate does not implement a proving system, on purpose. Proving is
//! the job of an external component (a WASM circuit runner, a native
//! library, a remote service) that is handed well-formed inputs and
//! returns a proof blob the crate treats as opaque JSON. [`Prover`] is
//! that boundary.
//!
//! What the crate *does* guarantee is everything around the call: inputs
//! are validated before they get here, the call runs on its own task so
//! dispatch never stalls behind it, failures surface as
//! `ProofGeneration` errors, and the output is returned verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::merkle::MerkleProof;

/// The external prover reported failure. The message is all we get —
/// the prover's internals are not ours to interpret.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProverFailure(pub String);

/// Everything a prover run needs. Assembled by a proof service after
/// validation and merkle resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProverInput {
    /// The identity's public commitment (the proven merkle leaf).
    pub identity_commitment: String,
    /// The message the proof binds to.
    pub signal: String,
    /// The context the proof binds to.
    pub external_nullifier: String,
    /// Resolved membership evidence.
    pub merkle_proof: MerkleProof,
    /// Path to the compiled circuit.
    pub circuit_file_path: String,
    /// Path to the proving key.
    pub zkey_file_path: String,
    /// RLN only: the rate-limit context identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rln_identifier: Option<String>,
}

/// An external component that turns valid inputs into a proof.
#[async_trait]
pub trait Prover: Send + Sync {
    /// Run the prover. Slow. Callers are expected to spawn this off the
    /// dispatch path.
    async fn prove(&self, input: ProverInput) -> Result<Value, ProverFailure>;
}

pub mod testing {
    //! A deterministic stand-in prover for tests: "proves" by hashing its
    //! inputs, so assertions can check that the right data reached it
    //! without depending on a real circuit.

    use super::*;
    use serde_json::json;

    /// Hashes its input into a stable fake proof blob.
    #[derive(Debug, Default)]
    pub struct HashProver;

    #[async_trait]
    impl Prover for HashProver {
        async fn prove(&self, input: ProverInput) -> Result<Value, ProverFailure> {
            let encoded = serde_json::to_vec(&input).map_err(|e| ProverFailure(e.to_string()))?;
            let digest = hex::encode(blake3::hash(&encoded).as_bytes());
            Ok(json!({
                "proof": digest,
                "publicSignals": [input.identity_commitment, input.signal],
                "epoch": "test-epoch",
                "snarkProof": digest,
                "rlnIdentifier": input.rln_identifier,
            }))
        }
    }

    /// Always fails, for exercising the error path.
    #[derive(Debug, Default)]
    pub struct FailingProver;

    #[async_trait]
    impl Prover for FailingProver {
        async fn prove(&self, _input: ProverInput) -> Result<Value, ProverFailure> {
            Err(ProverFailure("circuit exploded".to_string()))
        }
    }
}
