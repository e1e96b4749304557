//! # Proof Module
//!
//! Everything between "a page asked for a proof" and "an opaque prover
//! produced one":
//!
//! ```text
//! merkle.rs    — Proof sources, the validator, the BLAKE3 tree builder,
//!                and the resolver seam that turns a source into a proof
//! prover.rs    — The opaque external prover trait (the crate never looks
//!                inside a proof)
//! semaphore.rs — The Semaphore proof service
//! rln.rs       — The RLN proof service (rate-limiting nullifier)
//! ```
//!
//! The services share one shape: validate the merkle source, resolve it to
//! a concrete inclusion proof, compute the identity commitment, hand the
//! whole bundle to the prover on a spawned task, and return its output
//! verbatim. Proving is the slow part — it must never stall dispatch.

pub mod merkle;
pub mod prover;
pub mod rln;
pub mod semaphore;

pub use merkle::{
    build_proof, verify_proof, LocalResolver, MerkleProof, MerkleProofArtifacts,
    MerkleProofSource, MerkleResolver, ValidationError,
};
pub use prover::{Prover, ProverFailure, ProverInput};
pub use rln::{RlnProof, RlnProofRequest, RlnProofService};
pub use semaphore::{SemaphoreProof, SemaphoreProofRequest, SemaphoreProofService};
