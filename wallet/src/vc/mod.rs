//! # Verifiable Credentials
//!
//! Third-party attestations the wallet holds on the user's behalf, and
//! the presentations it signs over them.
//!
//! A credential is an ed25519-signed statement by an issuer about a
//! subject. The wallet verifies the issuer's signature before accepting
//! one into storage; a credential that does not verify never lands. A
//! presentation bundles stored credentials and counter-signs them with
//! the wallet's own holder key, so a relying party can check both who
//! issued each claim and who is presenting it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::storage::{keys, SecureStorage, StorageError};
use crate::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The issuer's signature does not cover this credential's content.
    #[error("credential signature does not verify")]
    BadSignature,

    /// The issuer (or holder) key is not a valid ed25519 public key.
    #[error("malformed signer key: {0}")]
    BadKey(String),

    #[error("credential {0} is already stored")]
    Duplicate(String),

    #[error("credential {0} is not stored")]
    NotFound(String),

    #[error("malformed credential: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// An issuer-signed statement about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    pub id: String,
    /// Issuer's ed25519 public key, hex.
    pub issuer: String,
    /// Who the claims are about.
    pub subject: String,
    /// The claims themselves, issuer-defined shape.
    pub claims: Value,
    pub issued_at: DateTime<Utc>,
    /// Issuer's signature over everything above, hex.
    pub signature: String,
}

/// The byte string a credential's signature covers. Field order is
/// fixed by this struct; both issuance and verification go through it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialSigningView<'a> {
    id: &'a str,
    issuer: &'a str,
    subject: &'a str,
    claims: &'a Value,
    issued_at: &'a DateTime<Utc>,
}

impl VerifiableCredential {
    /// Issue and sign a credential with `issuer_key`, dated now.
    pub fn issue(
        issuer_key: &SigningKey,
        subject: impl Into<String>,
        claims: Value,
    ) -> Result<Self, CredentialError> {
        let mut credential = Self {
            id: Uuid::new_v4().to_string(),
            issuer: hex::encode(issuer_key.verifying_key().to_bytes()),
            subject: subject.into(),
            claims,
            issued_at: Utc::now(),
            signature: String::new(),
        };
        let signature = issuer_key.sign(&credential.signing_bytes()?);
        credential.signature = hex::encode(signature.to_bytes());
        Ok(credential)
    }

    /// Check the issuer's signature.
    pub fn verify(&self) -> Result<(), CredentialError> {
        let key = decode_verifying_key(&self.issuer)?;
        let signature = decode_signature(&self.signature)?;
        key.verify(&self.signing_bytes()?, &signature)
            .map_err(|_| CredentialError::BadSignature)
    }

    fn signing_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        serde_json::to_vec(&CredentialSigningView {
            id: &self.id,
            issuer: &self.issuer,
            subject: &self.subject,
            claims: &self.claims,
            issued_at: &self.issued_at,
        })
        .map_err(|e| CredentialError::Malformed(e.to_string()))
    }
}

fn decode_verifying_key(hex_key: &str) -> Result<VerifyingKey, CredentialError> {
    let bytes = hex::decode(hex_key).map_err(|e| CredentialError::BadKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CredentialError::BadKey("key is not 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CredentialError::BadKey(e.to_string()))
}

fn decode_signature(hex_sig: &str) -> Result<Signature, CredentialError> {
    let bytes = hex::decode(hex_sig).map_err(|e| CredentialError::Malformed(e.to_string()))?;
    Signature::from_slice(&bytes).map_err(|e| CredentialError::Malformed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Stored credentials, keyed by id. Signature-checked on the way in.
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
    /// All credentials live under one key; mutations read, modify, and
    /// rewrite the whole list and must not interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Verify and persist a credential. A credential whose signature
    /// does not check out never touches storage.
    pub async fn add(&self, credential: VerifiableCredential) -> crate::Result<()> {
        credential.verify().map_err(Error::Credential)?;

        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await?;
        if all.iter().any(|c| c.id == credential.id) {
            return Err(CredentialError::Duplicate(credential.id).into());
        }
        debug!(id = %credential.id, subject = %credential.subject, "credential stored");
        all.push(credential);
        self.save_all(&all).await
    }

    pub async fn get(&self, id: &str) -> crate::Result<VerifiableCredential> {
        self.load_all()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CredentialError::NotFound(id.to_string()).into())
    }

    /// Every stored credential, insertion order.
    pub async fn list(&self) -> crate::Result<Vec<VerifiableCredential>> {
        self.load_all().await
    }

    pub async fn delete(&self, id: &str) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await?;
        let before = all.len();
        all.retain(|c| c.id != id);
        if all.len() == before {
            return Err(CredentialError::NotFound(id.to_string()).into());
        }
        self.save_all(&all).await
    }

    async fn load_all(&self) -> crate::Result<Vec<VerifiableCredential>> {
        match self.storage.get(keys::CREDENTIALS).await? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                StorageError::Corrupt {
                    key: keys::CREDENTIALS.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    async fn save_all(&self, all: &[VerifiableCredential]) -> crate::Result<()> {
        let value = serde_json::to_value(all)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.set(keys::CREDENTIALS, value).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// A holder-signed bundle of credentials for a relying party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiablePresentation {
    pub id: String,
    /// Holder's ed25519 public key, hex.
    pub holder: String,
    pub credentials: Vec<VerifiableCredential>,
    /// Relying-party challenge bound into the signature, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Holder's signature over everything above, hex.
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresentationSigningView<'a> {
    id: &'a str,
    holder: &'a str,
    credentials: &'a [VerifiableCredential],
    challenge: &'a Option<String>,
    created_at: &'a DateTime<Utc>,
}

impl VerifiablePresentation {
    /// Check the holder's signature. Credential signatures are checked
    /// at storage time, not here.
    pub fn verify(&self) -> Result<(), CredentialError> {
        let key = decode_verifying_key(&self.holder)?;
        let signature = decode_signature(&self.signature)?;
        key.verify(&self.signing_bytes()?, &signature)
            .map_err(|_| CredentialError::BadSignature)
    }

    fn signing_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        serde_json::to_vec(&PresentationSigningView {
            id: &self.id,
            holder: &self.holder,
            credentials: &self.credentials,
            challenge: &self.challenge,
            created_at: &self.created_at,
        })
        .map_err(|e| CredentialError::Malformed(e.to_string()))
    }
}

/// The wallet's holder key and its signing operation.
pub struct PresentationSigner {
    signing_key: SigningKey,
}

impl PresentationSigner {
    /// A signer with a fresh random holder key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// The holder's public key, hex.
    pub fn holder(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a presentation over `credentials`, binding in the relying
    /// party's `challenge` when it sent one, dated now.
    pub fn present(
        &self,
        credentials: Vec<VerifiableCredential>,
        challenge: Option<String>,
    ) -> Result<VerifiablePresentation, CredentialError> {
        let mut presentation = VerifiablePresentation {
            id: Uuid::new_v4().to_string(),
            holder: self.holder(),
            credentials,
            challenge,
            created_at: Utc::now(),
            signature: String::new(),
        };
        let signature = self.signing_key.sign(&presentation.signing_bytes()?);
        presentation.signature = hex::encode(signature.to_bytes());
        Ok(presentation)
    }
}
