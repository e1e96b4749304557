//! # Crate Error Taxonomy
//!
//! One enum, one failure vocabulary. Component modules define their own
//! precise error types (`ValidationError`, `StorageError`, ...) and this
//! module folds them into the single [`Error`] that crosses component
//! boundaries and, ultimately, the trust boundary.
//!
//! Two rules govern propagation:
//!
//! 1. Anything that reaches the page does so as an `error: true` envelope
//!    whose payload is the `Display` output of the [`Error`]. Nothing in
//!    this crate throws across the boundary.
//! 2. [`Error::Protocol`] is special: it marks traffic that cannot be
//!    routed at all (unparseable envelope, orphan nonce). Such traffic is
//!    logged and dropped — it never rejects a caller's pending operation,
//!    because there is no identifiable caller to reject.

use thiserror::Error;

use crate::identity::IdentityError;
use crate::proof::merkle::ValidationError;
use crate::storage::StorageError;
use crate::vc::CredentialError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the mediation layer can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unroutable traffic. Dropped at the boundary, never
    /// surfaced to a pending caller.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Dispatch was asked for a method no handler is registered under.
    /// The message shape is part of the public contract — client code
    /// matches on it.
    #[error("{0} is not detected")]
    MethodNotFound(String),

    /// A request payload failed validation before any work was done.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The user declined the pending request, or the approval surface was
    /// closed without an answer (treated as a decline).
    #[error("user rejected the request")]
    ApprovalRejected,

    /// A resolution call referenced a pending-request id that does not
    /// exist — either it never did, or it was already resolved.
    #[error("no pending request with id {0}")]
    UnknownRequest(String),

    /// The storage backend failed or returned a corrupt record.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Identity construction, serialization, or lookup failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Verifiable-credential verification or lookup failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The external prover failed. No partial proof state is retained.
    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    /// An `error: true` envelope came back over the wire. The payload is
    /// the remote error message, verbatim.
    #[error("{0}")]
    Rpc(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_message_shape() {
        let err = Error::MethodNotFound("unknown".to_string());
        assert_eq!(err.to_string(), "unknown is not detected");
    }

    #[test]
    fn rpc_error_is_verbatim() {
        let err = Error::Rpc("something broke upstream".to_string());
        assert_eq!(err.to_string(), "something broke upstream");
    }

    #[test]
    fn validation_errors_fold_in_transparently() {
        let err: Error = ValidationError::NoProofProvided.into();
        assert!(err.to_string().contains("no merkle proof"));
    }
}
