//! # Injected Client
//!
//! The page-facing surface of the boundary. Each operation the wallet
//! exposes appears here as a typed async method; every call composes an
//! [`RpcMessage`], stamps the page's origin into the meta, and awaits
//! the gateway's correlated reply.
//!
//! The client decides nothing. Consent, identity selection, and storage
//! all happen on the background side; this type is strictly a typed
//! dialing surface.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::router::RequestMeta;
use crate::rpc::{RpcGateway, RpcMessage, RpcMethod};
use crate::Result;

/// The typed API a page sees.
pub struct InjectedClient {
    gateway: Arc<RpcGateway>,
    origin: String,
}

impl InjectedClient {
    pub fn new(gateway: Arc<RpcGateway>, origin: impl Into<String>) -> Self {
        Self {
            gateway,
            origin: origin.into(),
        }
    }

    /// The origin this client attests on every call.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    async fn call(&self, method: RpcMethod, payload: Value) -> Result<Value> {
        let meta = serde_json::to_value(RequestMeta {
            origin: Some(self.origin.clone()),
        })
        .unwrap_or(Value::Null);

        self.gateway
            .send(RpcMessage {
                method: method.as_str().to_string(),
                payload: Some(payload),
                error: false,
                meta: Some(meta),
            })
            .await
    }

    /// Ask the wallet to connect an identity to this origin.
    pub async fn connect(&self) -> Result<Value> {
        self.call(RpcMethod::Connect, Value::Null).await
    }

    /// Read the non-secret data of the identity connected to this origin.
    pub async fn get_connected_identity_data(&self) -> Result<Value> {
        self.call(RpcMethod::GetConnectedIdentityData, Value::Null)
            .await
    }

    /// Generate a Semaphore proof with the connected identity.
    pub async fn generate_semaphore_proof(&self, request: Value) -> Result<Value> {
        self.call(RpcMethod::GenerateSemaphoreProof, request).await
    }

    /// Generate an RLN proof with the connected identity.
    pub async fn generate_rln_proof(&self, request: Value) -> Result<Value> {
        self.call(RpcMethod::GenerateRlnProof, request).await
    }

    /// Join a group with the connected identity's commitment.
    pub async fn join_group(&self, group_id: &str) -> Result<Value> {
        self.call(RpcMethod::JoinGroup, json!({ "groupId": group_id }))
            .await
    }

    /// Build a merkle inclusion proof over a joined group.
    pub async fn generate_group_merkle_proof(&self, group_id: &str) -> Result<Value> {
        self.call(
            RpcMethod::GenerateGroupMerkleProof,
            json!({ "groupId": group_id }),
        )
        .await
    }

    /// Hand the wallet a verifiable credential for safekeeping.
    pub async fn add_verifiable_credential(&self, credential: Value) -> Result<Value> {
        self.call(RpcMethod::AddVerifiableCredential, credential)
            .await
    }

    /// Ask the wallet to sign a presentation over stored credentials.
    pub async fn generate_verifiable_presentation(&self, request: Value) -> Result<Value> {
        self.call(RpcMethod::GenerateVerifiablePresentation, request)
            .await
    }

    /// Ask the wallet to disclose the connected commitment to this origin.
    pub async fn reveal_connected_identity_commitment(&self) -> Result<Value> {
        self.call(RpcMethod::RevealConnectedIdentityCommitment, Value::Null)
            .await
    }

    /// Import an externally created identity.
    pub async fn import_identity(&self, request: Value) -> Result<Value> {
        self.call(RpcMethod::ImportIdentity, request).await
    }
}
