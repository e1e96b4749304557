//! # Identity Factory
//!
//! The single sanctioned entry point for minting identities, polymorphic
//! over a closed strategy set:
//!
//! - **random** — fresh secret from the OS CSPRNG. Unlinkable to anything.
//! - **deterministic** — secret derived by SHA-256 from a caller-supplied
//!   signed message. The same message always reproduces the same secret
//!   and therefore the same commitment, which is exactly what makes the
//!   identity recoverable: sign the same challenge again on a new device
//!   and you are holding the same identity.
//!
//! The factory does not verify the signed message's signature — the
//! authentication flow that produced it already did. What matters here is
//! only that the derivation is a pure function of the message bytes.

use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::zk_identity::{IdentityMetadata, IdentitySecret, ZkIdentity};
use super::IdentityError;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The closed set of identity-creation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStrategy {
    /// Fresh CSPRNG secret.
    Random,
    /// Secret derived from a signed message.
    Deterministic,
}

impl FromStr for IdentityStrategy {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "deterministic" => Ok(Self::Deterministic),
            other => Err(IdentityError::UnknownStrategy(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Inputs to identity creation, beyond the strategy itself.
#[derive(Debug, Clone, Default)]
pub struct CreateIdentityOptions {
    /// The wallet account the identity belongs to.
    pub account: String,
    /// User-chosen display name.
    pub name: String,
    /// The web2 provider involved in a deterministic flow, if any.
    pub web2_provider: Option<String>,
    /// The signed message to derive from. Required for
    /// [`IdentityStrategy::Deterministic`], ignored otherwise.
    pub signed_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds [`ZkIdentity`] values. Stateless; exists so the construction
/// paths live in one place and nowhere else.
#[derive(Debug, Default)]
pub struct IdentityFactory;

impl IdentityFactory {
    /// Create an identity with the given strategy.
    ///
    /// # Errors
    ///
    /// [`IdentityError::MissingSignedMessage`] when the deterministic
    /// strategy is asked for without a message to derive from.
    pub fn create(
        &self,
        strategy: IdentityStrategy,
        options: CreateIdentityOptions,
    ) -> Result<ZkIdentity, IdentityError> {
        let secret = match strategy {
            IdentityStrategy::Random => random_secret(),
            IdentityStrategy::Deterministic => {
                let message = options
                    .signed_message
                    .as_deref()
                    .ok_or(IdentityError::MissingSignedMessage)?;
                deterministic_secret(message)
            }
        };

        let metadata = IdentityMetadata {
            account: options.account,
            name: options.name,
            strategy,
            web2_provider: options.web2_provider,
        };

        Ok(ZkIdentity::new(secret, metadata))
    }
}

/// 32 random bytes each for trapdoor and nullifier, from the OS RNG.
fn random_secret() -> IdentitySecret {
    let mut rng = rand::rngs::OsRng;
    let mut trapdoor = [0u8; 32];
    let mut nullifier = [0u8; 32];
    rng.fill_bytes(&mut trapdoor);
    rng.fill_bytes(&mut nullifier);
    IdentitySecret {
        trapdoor: hex::encode(trapdoor),
        nullifier: hex::encode(nullifier),
    }
}

/// Derive the secret pair from a signed message. Separate SHA-256 domains
/// for trapdoor and nullifier so the two halves are independent.
fn deterministic_secret(message: &str) -> IdentitySecret {
    let trapdoor = Sha256::new()
        .chain_update(message.as_bytes())
        .chain_update(b"/trapdoor")
        .finalize();
    let nullifier = Sha256::new()
        .chain_update(message.as_bytes())
        .chain_update(b"/nullifier")
        .finalize();
    IdentitySecret {
        trapdoor: hex::encode(trapdoor),
        nullifier: hex::encode(nullifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(message: Option<&str>) -> CreateIdentityOptions {
        CreateIdentityOptions {
            account: "account-0".to_string(),
            name: "test".to_string(),
            web2_provider: None,
            signed_message: message.map(str::to_string),
        }
    }

    #[test]
    fn random_identities_are_distinct() {
        let factory = IdentityFactory;
        let a = factory
            .create(IdentityStrategy::Random, options(None))
            .unwrap();
        let b = factory
            .create(IdentityStrategy::Random, options(None))
            .unwrap();
        assert_ne!(a.commitment(), b.commitment());
    }

    #[test]
    fn deterministic_same_message_same_commitment() {
        let factory = IdentityFactory;
        let a = factory
            .create(IdentityStrategy::Deterministic, options(Some("signed:hello")))
            .unwrap();
        let b = factory
            .create(IdentityStrategy::Deterministic, options(Some("signed:hello")))
            .unwrap();
        assert_eq!(a.commitment(), b.commitment());
        assert_eq!(a.secret(), b.secret());
    }

    #[test]
    fn deterministic_different_messages_diverge() {
        let factory = IdentityFactory;
        let a = factory
            .create(IdentityStrategy::Deterministic, options(Some("signed:one")))
            .unwrap();
        let b = factory
            .create(IdentityStrategy::Deterministic, options(Some("signed:two")))
            .unwrap();
        assert_ne!(a.commitment(), b.commitment());
    }

    #[test]
    fn deterministic_without_message_fails() {
        let factory = IdentityFactory;
        let err = factory
            .create(IdentityStrategy::Deterministic, options(None))
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingSignedMessage));
    }

    #[test]
    fn strategy_parses_from_wire_names() {
        assert_eq!(
            "random".parse::<IdentityStrategy>().unwrap(),
            IdentityStrategy::Random
        );
        assert_eq!(
            "deterministic".parse::<IdentityStrategy>().unwrap(),
            IdentityStrategy::Deterministic
        );
        assert!(matches!(
            "quantum".parse::<IdentityStrategy>(),
            Err(IdentityError::UnknownStrategy(s)) if s == "quantum"
        ));
    }

    #[test]
    fn metadata_carries_through() {
        let factory = IdentityFactory;
        let identity = factory
            .create(
                IdentityStrategy::Deterministic,
                CreateIdentityOptions {
                    account: "acct".to_string(),
                    name: "work".to_string(),
                    web2_provider: Some("github".to_string()),
                    signed_message: Some("m".to_string()),
                },
            )
            .unwrap();

        let meta = identity.metadata();
        assert_eq!(meta.account, "acct");
        assert_eq!(meta.name, "work");
        assert_eq!(meta.strategy, IdentityStrategy::Deterministic);
        assert_eq!(meta.web2_provider.as_deref(), Some("github"));
    }
}
