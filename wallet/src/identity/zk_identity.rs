//! # ZkIdentity — the identity model
//!
//! An identity is a secret pair (trapdoor, nullifier) plus metadata. The
//! public face of an identity is its *commitment*: a BLAKE3 digest of the
//! secret, safe to disclose, stable forever. Everything the page is ever
//! allowed to learn about an identity derives from the commitment and the
//! metadata — the secret stays on this side of the trust boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::factory::IdentityStrategy;
use super::IdentityError;
use crate::config;

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// The private half of an identity: two 32-byte values, hex-encoded.
///
/// The split mirrors what downstream circuits expect — the trapdoor feeds
/// the commitment, the nullifier feeds per-context nullifier hashes. To
/// this crate both are opaque; it only ever hashes them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySecret {
    /// Hex-encoded 32-byte trapdoor.
    pub trapdoor: String,
    /// Hex-encoded 32-byte nullifier.
    pub nullifier: String,
}

// Secrets must never leak through Debug formatting into logs or panics.
impl fmt::Debug for IdentitySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySecret")
            .field("trapdoor", &"<redacted>")
            .field("nullifier", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// User-facing identity metadata. None of it is secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMetadata {
    /// The wallet account this identity belongs to.
    pub account: String,
    /// Display name chosen by the user.
    pub name: String,
    /// The strategy this identity was created with.
    pub strategy: IdentityStrategy,
    /// The web2 provider a deterministic identity was derived through,
    /// when there was one (e.g. "twitter", "github").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web2_provider: Option<String>,
}

// ---------------------------------------------------------------------------
// ZkIdentity
// ---------------------------------------------------------------------------

/// A zero-knowledge identity held by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkIdentity {
    secret: IdentitySecret,
    metadata: IdentityMetadata,
}

impl ZkIdentity {
    /// Assemble an identity from existing parts. Use the
    /// [`IdentityFactory`](super::IdentityFactory) unless you are importing
    /// or deserializing an identity that already exists.
    pub fn new(secret: IdentitySecret, metadata: IdentityMetadata) -> Self {
        Self { secret, metadata }
    }

    /// The identity's secret. Handle with care — this never crosses the
    /// trust boundary.
    pub fn secret(&self) -> &IdentitySecret {
        &self.secret
    }

    /// The identity's metadata.
    pub fn metadata(&self) -> &IdentityMetadata {
        &self.metadata
    }

    /// The public commitment: hex BLAKE3 of the domain-tagged secret.
    ///
    /// Pure and deterministic — two identities with equal secrets have
    /// equal commitments, always.
    pub fn commitment(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(config::COMMITMENT_DOMAIN);
        hasher.update(self.secret.trapdoor.as_bytes());
        hasher.update(self.secret.nullifier.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Serialize to the canonical single-string form: JSON of
    /// `{secret, metadata}`.
    pub fn serialize(&self) -> String {
        serde_json::json!({
            "secret": self.secret,
            "metadata": self.metadata,
        })
        .to_string()
    }

    /// Parse an identity back from its serialized form.
    ///
    /// Field-level absence gets a precise error so a corrupt store entry
    /// can be diagnosed without dumping the record anywhere.
    pub fn deserialize(raw: &str) -> Result<Self, IdentityError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| IdentityError::Malformed(e.to_string()))?;

        let secret = value
            .get("secret")
            .filter(|v| !v.is_null())
            .ok_or(IdentityError::MissingSecret)?;
        let metadata = value
            .get("metadata")
            .filter(|v| !v.is_null())
            .ok_or(IdentityError::MissingMetadata)?;

        let secret: IdentitySecret = serde_json::from_value(secret.clone())
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        let metadata: IdentityMetadata = serde_json::from_value(metadata.clone())
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;

        Ok(Self { secret, metadata })
    }
}
