//! # Identity Module
//!
//! The zero-knowledge identity stack, layered:
//!
//! 1. **ZkIdentity** — The secret pair (trapdoor + nullifier), its public
//!    commitment, and user-facing metadata. See [`zk_identity`].
//! 2. **Factory** — The only sanctioned way to mint one, polymorphic over
//!    creation strategy (random or deterministic). See [`factory`].
//! 3. **Store** — Persistence over secure storage, keyed by commitment,
//!    with an explicit no-silent-overwrite rule. See [`store`].
//!
//! ## Design Decisions
//!
//! - The commitment is a pure function of the secret: BLAKE3 over the
//!   domain-tagged trapdoor‖nullifier bytes. Recomputing it twice from the
//!   same secret always yields the same hex string, which is what lets a
//!   deterministic identity be *recovered* rather than merely re-created.
//! - Identities serialize to a single JSON string `{secret, metadata}`.
//!   That string is the unit of persistence and of import/export.
//! - Secrets never appear in `Debug` output or logs.

pub mod factory;
pub mod store;
pub mod zk_identity;

use thiserror::Error;

pub use factory::{CreateIdentityOptions, IdentityFactory, IdentityStrategy};
pub use store::IdentityStore;
pub use zk_identity::{IdentityMetadata, IdentitySecret, ZkIdentity};

/// Errors from identity construction, serialization, and lookup.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A serialized record had no `secret` field.
    #[error("serialized identity is missing its secret")]
    MissingSecret,

    /// A serialized record had no `metadata` field.
    #[error("serialized identity is missing its metadata")]
    MissingMetadata,

    /// The deterministic strategy needs a signed message to derive from
    /// and none was supplied.
    #[error("deterministic identity creation requires a signed message")]
    MissingSignedMessage,

    /// A strategy name that is not part of the closed strategy set.
    #[error("unknown identity strategy: {0}")]
    UnknownStrategy(String),

    /// The record parsed as JSON but not as an identity.
    #[error("malformed identity record: {0}")]
    Malformed(String),

    /// An identity with this commitment already exists. Identities are
    /// never silently overwritten.
    #[error("identity {0} already exists")]
    DuplicateCommitment(String),

    /// No identity is stored under this commitment.
    #[error("no identity with commitment {0}")]
    NotFound(String),
}
