//! The wallet service: every operation a page can invoke, and the
//! router wiring that gates each one.
//!
//! | method | gates |
//! |--------|-------|
//! | `connect` | approval |
//! | `get-connected-identity-data` | unlock |
//! | everything else | unlock, then approval |
//!
//! Handlers receive the payload the gates let through. For consenting
//! operations that is the approval verdict's data when the surface
//! supplied any (`connect` relies on this: the user picks which
//! identity to connect), otherwise the page's original payload.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::approval::{ApprovalMiddleware, ApprovalQueue, ApprovalSurface, RequestKind};
use crate::group::GroupService;
use crate::identity::{IdentityMetadata, IdentitySecret, IdentityStore, IdentityStrategy, ZkIdentity};
use crate::proof::{
    LocalResolver, Prover, RlnProofRequest, RlnProofService, SemaphoreProofRequest,
    SemaphoreProofService,
};
use crate::router::{Handler, HandlerRouter, Middleware, RequestMeta};
use crate::rpc::RpcMethod;
use crate::storage::{keys, SecureStorage, StorageError};
use crate::vc::{CredentialStore, PresentationSigner, VerifiableCredential};
use crate::{Error, Result};

use super::history::HistoryLog;
use super::lock::{LockGate, UnlockMiddleware};

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// One host's connection to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedHost {
    pub host: String,
    pub commitment: String,
    /// Whether the host has been granted sight of the commitment.
    pub can_reveal: bool,
    pub connected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Everything the background side owns, behind one constructor.
pub struct WalletService {
    storage: Arc<dyn SecureStorage>,
    identities: IdentityStore,
    credentials: CredentialStore,
    groups: GroupService,
    semaphore: SemaphoreProofService,
    rln: RlnProofService,
    approvals: Arc<ApprovalQueue>,
    history: HistoryLog,
    lock: Arc<LockGate>,
    signer: PresentationSigner,
}

impl WalletService {
    /// Assemble the service. Starts locked.
    pub fn new(
        storage: Arc<dyn SecureStorage>,
        prover: Arc<dyn Prover>,
        surface: Arc<dyn ApprovalSurface>,
        signer: PresentationSigner,
    ) -> Self {
        let resolver = Arc::new(LocalResolver);
        Self {
            identities: IdentityStore::new(Arc::clone(&storage)),
            credentials: CredentialStore::new(Arc::clone(&storage)),
            groups: GroupService::new(Arc::clone(&storage)),
            semaphore: SemaphoreProofService::new(Arc::clone(&prover), resolver.clone()),
            rln: RlnProofService::new(prover, resolver),
            approvals: Arc::new(ApprovalQueue::new(surface)),
            history: HistoryLog::new(Arc::clone(&storage)),
            lock: Arc::new(LockGate::new()),
            signer,
            storage,
        }
    }

    pub fn approvals(&self) -> &Arc<ApprovalQueue> {
        &self.approvals
    }

    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn groups(&self) -> &GroupService {
        &self.groups
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn unlock(&self) {
        self.lock.unlock();
    }

    pub fn lock(&self) {
        self.lock.lock();
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock.is_unlocked()
    }

    /// Wire every method into `router`. Called once at startup.
    pub fn register(self: &Arc<Self>, router: &HandlerRouter) -> Result<()> {
        use RpcMethod::*;

        router.register(Connect, vec![self.approval(RequestKind::Connect)], self.handler(Connect))?;
        router.register(GetConnectedIdentityData, vec![self.unlock_gate()], self.handler(GetConnectedIdentityData))?;

        let consenting: [(RpcMethod, RequestKind); 8] = [
            (GenerateSemaphoreProof, RequestKind::SemaphoreProof),
            (GenerateRlnProof, RequestKind::RlnProof),
            (JoinGroup, RequestKind::JoinGroup),
            (GenerateGroupMerkleProof, RequestKind::GroupMerkleProof),
            (AddVerifiableCredential, RequestKind::AddVerifiableCredential),
            (GenerateVerifiablePresentation, RequestKind::GenerateVerifiablePresentation),
            (RevealConnectedIdentityCommitment, RequestKind::RevealCommitment),
            (ImportIdentity, RequestKind::ImportIdentity),
        ];
        for (method, kind) in consenting {
            router.register(
                method,
                vec![self.unlock_gate(), self.approval(kind)],
                self.handler(method),
            )?;
        }

        info!(methods = router.len(), "wallet methods registered");
        Ok(())
    }

    fn unlock_gate(&self) -> Arc<dyn Middleware> {
        Arc::new(UnlockMiddleware::new(Arc::clone(&self.lock)))
    }

    fn approval(&self, kind: RequestKind) -> Arc<dyn Middleware> {
        Arc::new(ApprovalMiddleware::new(Arc::clone(&self.approvals), kind))
    }

    fn handler(self: &Arc<Self>, method: RpcMethod) -> Arc<MethodHandler> {
        Arc::new(MethodHandler {
            service: Arc::clone(self),
            method,
        })
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    async fn connection(&self, host: &str) -> Result<Option<ConnectedHost>> {
        let key = keys::scoped(keys::CONNECTIONS, host);
        match self.storage.get(&key).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| {
                    StorageError::Corrupt {
                        key,
                        reason: e.to_string(),
                    }
                    .into()
                }),
        }
    }

    async fn require_connection(&self, host: &str) -> Result<ConnectedHost> {
        self.connection(host)
            .await?
            .ok_or_else(|| Error::Protocol(format!("no identity is connected to {host}")))
    }

    async fn save_connection(&self, connection: &ConnectedHost) -> Result<()> {
        let value = serde_json::to_value(connection)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage
            .set(&keys::scoped(keys::CONNECTIONS, &connection.host), value)
            .await?;
        Ok(())
    }

    async fn connected_identity(&self, host: &str) -> Result<ZkIdentity> {
        let connection = self.require_connection(host).await?;
        self.identities.require(&connection.commitment).await
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// `connect`. The payload is the approval verdict's data; the
    /// surface names the commitment the user picked.
    async fn handle_connect(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let commitment = payload
            .get("commitment")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("consent verdict named no commitment".into()))?;

        let identity = self.identities.require(commitment).await?;
        self.save_connection(&ConnectedHost {
            host: host.clone(),
            commitment: commitment.to_string(),
            can_reveal: false,
            connected_at: Utc::now(),
        })
        .await?;
        self.history.append(RpcMethod::Connect, Some(&host)).await?;
        info!(%host, "identity connected");

        to_wire(identity.metadata())
    }

    /// `get-connected-identity-data`. Metadata always; the commitment
    /// only once the host has been granted reveal.
    async fn handle_get_connected_identity_data(&self, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let connection = self.require_connection(&host).await?;
        let identity = self.identities.require(&connection.commitment).await?;

        let mut data = to_wire(identity.metadata())?;
        if connection.can_reveal {
            data["commitment"] = Value::String(connection.commitment);
        }
        Ok(data)
    }

    async fn handle_semaphore_proof(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let request: SemaphoreProofRequest = from_wire(payload)?;
        let identity = self.connected_identity(&host).await?;

        let proof = self.semaphore.gen_proof(&identity, &request).await?;
        self.history
            .append(RpcMethod::GenerateSemaphoreProof, Some(&host))
            .await?;
        to_wire(&proof)
    }

    async fn handle_rln_proof(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let request: RlnProofRequest = from_wire(payload)?;
        let identity = self.connected_identity(&host).await?;

        let proof = self.rln.gen_proof(&identity, &request).await?;
        self.history
            .append(RpcMethod::GenerateRlnProof, Some(&host))
            .await?;
        to_wire(&proof)
    }

    async fn handle_join_group(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let group_id = require_group_id(&payload)?;
        let identity = self.connected_identity(&host).await?;

        self.groups.join(group_id, &identity.commitment()).await?;
        self.history.append(RpcMethod::JoinGroup, Some(&host)).await?;
        Ok(json!({ "groupId": group_id, "joined": true }))
    }

    async fn handle_group_merkle_proof(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let group_id = require_group_id(&payload)?;
        let identity = self.connected_identity(&host).await?;

        let proof = self
            .groups
            .merkle_proof_value(group_id, &identity.commitment())
            .await?;
        self.history
            .append(RpcMethod::GenerateGroupMerkleProof, Some(&host))
            .await?;
        Ok(proof)
    }

    async fn handle_add_credential(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let credential: VerifiableCredential = from_wire(payload)?;
        let id = credential.id.clone();

        self.credentials.add(credential).await?;
        self.history
            .append(RpcMethod::AddVerifiableCredential, Some(&host))
            .await?;
        Ok(json!({ "id": id }))
    }

    async fn handle_presentation(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let ids: Vec<String> = payload
            .get("credentialIds")
            .cloned()
            .map(|v| from_wire(v))
            .transpose()?
            .unwrap_or_default();
        if ids.is_empty() {
            return Err(Error::Protocol(
                "a presentation needs at least one credential id".into(),
            ));
        }

        let mut selected = Vec::with_capacity(ids.len());
        for id in &ids {
            selected.push(self.credentials.get(id).await?);
        }

        let challenge = payload
            .get("challenge")
            .and_then(Value::as_str)
            .map(str::to_string);
        let presentation = self
            .signer
            .present(selected, challenge)
            .map_err(Error::Credential)?;
        self.history
            .append(RpcMethod::GenerateVerifiablePresentation, Some(&host))
            .await?;
        to_wire(&presentation)
    }

    async fn handle_reveal(&self, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let mut connection = self.require_connection(&host).await?;
        connection.can_reveal = true;
        self.save_connection(&connection).await?;
        self.history
            .append(RpcMethod::RevealConnectedIdentityCommitment, Some(&host))
            .await?;
        info!(%host, "commitment revealed");
        Ok(json!({ "commitment": connection.commitment }))
    }

    async fn handle_import_identity(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let host = require_origin(meta)?;
        let import: ImportRequest = from_wire(payload)?;
        import.check_secret()?;

        let identity = ZkIdentity::new(
            IdentitySecret {
                trapdoor: import.trapdoor,
                nullifier: import.nullifier,
            },
            IdentityMetadata {
                account: import.account.unwrap_or_default(),
                name: import.name,
                strategy: import.strategy,
                web2_provider: None,
            },
        );
        let commitment = self.identities.insert(&identity).await?;
        self.history
            .append(RpcMethod::ImportIdentity, Some(&host))
            .await?;
        Ok(json!({ "commitment": commitment }))
    }
}

/// An externally created identity, as a page submits it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    trapdoor: String,
    nullifier: String,
    name: String,
    #[serde(default)]
    account: Option<String>,
    #[serde(default = "default_import_strategy")]
    strategy: IdentityStrategy,
}

fn default_import_strategy() -> IdentityStrategy {
    IdentityStrategy::Random
}

impl ImportRequest {
    /// Both halves of the secret must be 32 bytes of hex.
    fn check_secret(&self) -> Result<()> {
        for (label, value) in [("trapdoor", &self.trapdoor), ("nullifier", &self.nullifier)] {
            let bytes = hex::decode(value)
                .map_err(|_| Error::Protocol(format!("{label} is not valid hex")))?;
            if bytes.len() != 32 {
                return Err(Error::Protocol(format!("{label} is not 32 bytes")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Router glue
// ---------------------------------------------------------------------------

/// The terminal stage for one method.
pub struct MethodHandler {
    service: Arc<WalletService>,
    method: RpcMethod,
}

#[async_trait]
impl Handler for MethodHandler {
    async fn call(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let svc = &self.service;
        match self.method {
            RpcMethod::Connect => svc.handle_connect(payload, meta).await,
            RpcMethod::GetConnectedIdentityData => {
                svc.handle_get_connected_identity_data(meta).await
            }
            RpcMethod::GenerateSemaphoreProof => svc.handle_semaphore_proof(payload, meta).await,
            RpcMethod::GenerateRlnProof => svc.handle_rln_proof(payload, meta).await,
            RpcMethod::JoinGroup => svc.handle_join_group(payload, meta).await,
            RpcMethod::GenerateGroupMerkleProof => {
                svc.handle_group_merkle_proof(payload, meta).await
            }
            RpcMethod::AddVerifiableCredential => svc.handle_add_credential(payload, meta).await,
            RpcMethod::GenerateVerifiablePresentation => {
                svc.handle_presentation(payload, meta).await
            }
            RpcMethod::RevealConnectedIdentityCommitment => svc.handle_reveal(meta).await,
            RpcMethod::ImportIdentity => svc.handle_import_identity(payload, meta).await,
        }
    }
}

fn require_origin(meta: &RequestMeta) -> Result<String> {
    meta.origin
        .clone()
        .ok_or_else(|| Error::Protocol("request carries no origin".into()))
}

fn require_group_id(payload: &Value) -> Result<&str> {
    payload
        .get("groupId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("request names no groupId".into()))
}

fn to_wire<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Protocol(e.to_string()))
}

fn from_wire<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("malformed payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalStatus, NullSurface};
    use crate::identity::{CreateIdentityOptions, IdentityFactory};
    use crate::proof::prover::testing::HashProver;
    use crate::router::RpcRequest;
    use crate::storage::MemoryStorage;

    const HOST: &str = "https://app.example";

    fn service() -> Arc<WalletService> {
        Arc::new(WalletService::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(HashProver),
            Arc::new(NullSurface),
            PresentationSigner::generate(),
        ))
    }

    async fn seeded_identity(svc: &WalletService) -> String {
        let identity = IdentityFactory
            .create(
                IdentityStrategy::Random,
                CreateIdentityOptions {
                    account: "0xacc".into(),
                    name: "primary".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        svc.identities().insert(&identity).await.unwrap()
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            origin: Some(HOST.into()),
        }
    }

    /// Drives the consent queue: approve everything that shows up,
    /// handing `data` to the first request.
    fn auto_approve(svc: &Arc<WalletService>, data: Option<Value>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(svc.approvals());
        tokio::spawn(async move {
            let mut data = data;
            loop {
                if let Some(request) = queue.pending().first().cloned() {
                    queue
                        .resolve(&request.id, ApprovalStatus::Approved, data.take())
                        .await
                        .unwrap();
                    return;
                }
                tokio::task::yield_now().await;
            }
        })
    }

    async fn connect(svc: &Arc<WalletService>, commitment: &str) {
        svc.handle_connect(json!({ "commitment": commitment }), &meta())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_persists_the_connection_and_returns_metadata() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;

        let data = svc
            .handle_connect(json!({ "commitment": commitment }), &meta())
            .await
            .unwrap();
        assert_eq!(data["name"], "primary");

        let connection = svc.require_connection(HOST).await.unwrap();
        assert_eq!(connection.commitment, commitment);
        assert!(!connection.can_reveal);
        assert_eq!(svc.history().entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_refuses_unknown_commitments() {
        let svc = service();
        let err = svc
            .handle_connect(json!({ "commitment": "0xghost" }), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Identity(_)));
        assert!(svc.connection(HOST).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_data_withholds_the_commitment_until_revealed() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;
        connect(&svc, &commitment).await;

        let data = svc.handle_get_connected_identity_data(&meta()).await.unwrap();
        assert_eq!(data["name"], "primary");
        assert!(data.get("commitment").is_none());

        let revealed = svc.handle_reveal(&meta()).await.unwrap();
        assert_eq!(revealed["commitment"], commitment);

        let data = svc.handle_get_connected_identity_data(&meta()).await.unwrap();
        assert_eq!(data["commitment"], commitment);
    }

    #[tokio::test]
    async fn join_group_then_prove_membership() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;
        connect(&svc, &commitment).await;

        svc.handle_join_group(json!({ "groupId": "voters" }), &meta())
            .await
            .unwrap();
        assert_eq!(svc.groups().members("voters").await.unwrap(), [commitment]);

        let proof = svc
            .handle_group_merkle_proof(json!({ "groupId": "voters" }), &meta())
            .await
            .unwrap();
        assert!(proof.get("root").is_some());
    }

    #[tokio::test]
    async fn semaphore_proof_runs_against_the_connected_identity() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;
        connect(&svc, &commitment).await;

        let request = json!({
            "externalNullifier": "poll-1",
            "signal": "yes",
            "circuitFilePath": "semaphore.wasm",
            "zkeyFilePath": "semaphore.zkey",
            "verificationKey": "vk",
            "merkleProofArtifacts": {
                "leaves": [commitment],
                "depth": 4,
                "leavesPerNode": 2,
            },
        });
        let proof = svc.handle_semaphore_proof(request, &meta()).await.unwrap();
        assert_eq!(proof["fullProof"]["publicSignals"][0], commitment);
    }

    #[tokio::test]
    async fn proof_without_a_connection_fails() {
        let svc = service();
        let err = svc
            .handle_semaphore_proof(
                json!({
                    "externalNullifier": "poll-1",
                    "signal": "yes",
                    "circuitFilePath": "semaphore.wasm",
                    "zkeyFilePath": "semaphore.zkey",
                    "verificationKey": "vk",
                    "merkleProofArtifacts": {"leaves": [], "depth": 2, "leavesPerNode": 2},
                }),
                &meta(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no identity is connected"));
    }

    #[tokio::test]
    async fn credentials_store_and_present() {
        let svc = service();
        let issuer = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        let credential =
            VerifiableCredential::issue(&issuer, "did:subject", json!({"member": true})).unwrap();
        let id = credential.id.clone();

        let out = svc
            .handle_add_credential(to_wire(&credential).unwrap(), &meta())
            .await
            .unwrap();
        assert_eq!(out["id"], id);

        let presentation = svc
            .handle_presentation(
                json!({ "credentialIds": [id], "challenge": "rp-nonce" }),
                &meta(),
            )
            .await
            .unwrap();
        let parsed: crate::vc::VerifiablePresentation =
            serde_json::from_value(presentation).unwrap();
        parsed.verify().unwrap();
        assert_eq!(parsed.challenge.as_deref(), Some("rp-nonce"));
    }

    #[tokio::test]
    async fn presentation_needs_credential_ids() {
        let svc = service();
        let err = svc
            .handle_presentation(json!({}), &meta())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one credential id"));
    }

    #[tokio::test]
    async fn import_accepts_well_formed_secrets_only() {
        let svc = service();
        let good = json!({
            "trapdoor": hex::encode([7u8; 32]),
            "nullifier": hex::encode([9u8; 32]),
            "name": "imported",
        });
        let out = svc.handle_import_identity(good, &meta()).await.unwrap();
        let commitment = out["commitment"].as_str().unwrap();
        assert!(svc.identities().get(commitment).await.unwrap().is_some());

        let bad = json!({
            "trapdoor": "zzzz",
            "nullifier": hex::encode([9u8; 32]),
            "name": "imported",
        });
        let err = svc.handle_import_identity(bad, &meta()).await.unwrap_err();
        assert!(err.to_string().contains("not valid hex"));
    }

    #[tokio::test]
    async fn all_methods_are_wired_with_consent_and_lock_gates() {
        let svc = service();
        let router = HandlerRouter::new();
        svc.register(&router).unwrap();
        assert_eq!(router.len(), RpcMethod::ALL.len());
    }

    #[tokio::test]
    async fn dispatching_connect_runs_the_consent_gate() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;
        let router = HandlerRouter::new();
        svc.register(&router).unwrap();

        let approver = auto_approve(&svc, Some(json!({ "commitment": commitment })));
        let data = router
            .dispatch(RpcRequest {
                method: RpcMethod::Connect,
                payload: Value::Null,
                meta: meta(),
            })
            .await
            .unwrap();
        approver.await.unwrap();

        assert_eq!(data["name"], "primary");
        assert!(svc.connection(HOST).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn locked_wallet_holds_consenting_calls_until_unlock() {
        let svc = service();
        let commitment = seeded_identity(&svc).await;
        connect(&svc, &commitment).await;
        let router = Arc::new(HandlerRouter::new());
        svc.register(&router).unwrap();

        let dispatch = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .dispatch(RpcRequest {
                        method: RpcMethod::JoinGroup,
                        payload: json!({ "groupId": "voters" }),
                        meta: meta(),
                    })
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        // Still parked behind the lock; no consent request exists yet.
        assert!(svc.approvals().is_empty());

        svc.unlock();
        let approver = auto_approve(&svc, None);
        let out = dispatch.await.unwrap().unwrap();
        approver.await.unwrap();
        assert_eq!(out["joined"], true);
    }
}
