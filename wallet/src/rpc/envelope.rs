//! # Message Envelope & Method Name-Space
//!
//! The wire unit of the RPC gateway, bit-exact per the boundary contract:
//!
//! ```json
//! {
//!   "target": "aegis-background",
//!   "nonce": "4f1c…",
//!   "message": { "method": "connect", "payload": {…}, "error": false, "meta": {…} }
//! }
//! ```
//!
//! `method` travels as a plain string (pages speak strings), but inside
//! the crate it is parsed into the closed [`RpcMethod`] enum immediately —
//! routing never happens on raw strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

// ---------------------------------------------------------------------------
// RPC Method Name-Space
// ---------------------------------------------------------------------------

/// The closed set of methods a page may invoke. Wire names are the
/// kebab-case spelling of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RpcMethod {
    /// Ask to connect an identity to the calling host.
    Connect,
    /// Read the non-secret data of the host's connected identity.
    GetConnectedIdentityData,
    /// Generate a Semaphore proof with the connected identity.
    GenerateSemaphoreProof,
    /// Generate an RLN proof with the connected identity.
    GenerateRlnProof,
    /// Join a group with the connected identity's commitment.
    JoinGroup,
    /// Build a merkle inclusion proof over a joined group.
    GenerateGroupMerkleProof,
    /// Store a verifiable credential in the wallet.
    AddVerifiableCredential,
    /// Sign a presentation over stored credentials.
    GenerateVerifiablePresentation,
    /// Disclose the connected identity's commitment to the host.
    RevealConnectedIdentityCommitment,
    /// Import an externally created identity.
    ImportIdentity,
}

impl RpcMethod {
    /// Every method, for exhaustive registration and tests.
    pub const ALL: [RpcMethod; 10] = [
        RpcMethod::Connect,
        RpcMethod::GetConnectedIdentityData,
        RpcMethod::GenerateSemaphoreProof,
        RpcMethod::GenerateRlnProof,
        RpcMethod::JoinGroup,
        RpcMethod::GenerateGroupMerkleProof,
        RpcMethod::AddVerifiableCredential,
        RpcMethod::GenerateVerifiablePresentation,
        RpcMethod::RevealConnectedIdentityCommitment,
        RpcMethod::ImportIdentity,
    ];

    /// The wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Connect => "connect",
            RpcMethod::GetConnectedIdentityData => "get-connected-identity-data",
            RpcMethod::GenerateSemaphoreProof => "generate-semaphore-proof",
            RpcMethod::GenerateRlnProof => "generate-rln-proof",
            RpcMethod::JoinGroup => "join-group",
            RpcMethod::GenerateGroupMerkleProof => "generate-group-merkle-proof",
            RpcMethod::AddVerifiableCredential => "add-verifiable-credential",
            RpcMethod::GenerateVerifiablePresentation => "generate-verifiable-presentation",
            RpcMethod::RevealConnectedIdentityCommitment => {
                "reveal-connected-identity-commitment"
            }
            RpcMethod::ImportIdentity => "import-identity",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcMethod {
    type Err = Error;

    /// Parse a wire method name. Anything outside the closed set fails
    /// with [`Error::MethodNotFound`] naming the offender.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| Error::MethodNotFound(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The message within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Wire method name. Parsed into [`RpcMethod`] at the boundary.
    pub method: String,
    /// Method arguments, or the response value on the way back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Set on responses that carry an error message in `payload`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    /// Caller context (origin, etc.), attached by the injecting side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// The wire unit: a targeted, nonce-correlated message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Which side of the boundary this is for.
    pub target: String,
    /// Unique-per-call correlation token.
    pub nonce: String,
    /// The message itself.
    pub message: RpcMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_methods_round_trip_their_wire_names() {
        for method in RpcMethod::ALL {
            let parsed: RpcMethod = method.as_str().parse().unwrap();
            assert_eq!(parsed, method);

            // serde spelling matches as_str spelling
            let encoded = serde_json::to_value(method).unwrap();
            assert_eq!(encoded, json!(method.as_str()));
        }
    }

    #[test]
    fn unknown_method_names_the_offender() {
        let err = "unknown".parse::<RpcMethod>().unwrap_err();
        assert_eq!(err.to_string(), "unknown is not detected");
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = Envelope {
            target: "aegis-background".into(),
            nonce: "n-1".into(),
            message: RpcMessage {
                method: "connect".into(),
                payload: Some(json!({"host": "example.org"})),
                error: false,
                meta: Some(json!({"origin": "example.org"})),
            },
        };

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["target"], "aegis-background");
        assert_eq!(wire["message"]["method"], "connect");
        // false error flag is omitted on the wire
        assert!(wire["message"].get("error").is_none());

        let back: Envelope = serde_json::from_value(wire).unwrap();
        assert_eq!(back.nonce, "n-1");
        assert!(!back.message.error);
    }

    #[test]
    fn error_envelope_keeps_its_flag() {
        let envelope = Envelope {
            target: "aegis-injected".into(),
            nonce: "n-2".into(),
            message: RpcMessage {
                method: "connect".into(),
                payload: Some(json!("user rejected the request")),
                error: true,
                meta: None,
            },
        };
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["message"]["error"], true);
    }
}
