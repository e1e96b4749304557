//! # Approval Queue
//!
//! Nothing consequential happens in this wallet without a human saying
//! yes. Handlers that need consent park their payload here and suspend;
//! the queue shows the user one request at a time through an
//! [`ApprovalSurface`] and wakes the parked handler with the verdict.
//!
//! | item | role |
//! |------|------|
//! | [`PendingRequest`] | one parked consent question |
//! | [`ApprovalQueue`] | FIFO of parked questions, at most one on screen |
//! | [`ApprovalSurface`] | how a question is physically shown (popup, test stub) |
//! | [`ApprovalMiddleware`] | pipeline stage that parks and awaits |
//!
//! A request resolves exactly once. The user's verdict, the surface
//! window closing, or queue shutdown — whichever lands first wins, and
//! later attempts fail with [`Error::UnknownRequest`](crate::Error).

mod queue;
mod surface;

pub use queue::{ApprovalAwaiter, ApprovalMiddleware, ApprovalQueue};
pub use surface::{ApprovalSurface, NullSurface, PopupOptions};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a parked request is asking permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    Connect,
    SemaphoreProof,
    RlnProof,
    JoinGroup,
    GroupMerkleProof,
    AddVerifiableCredential,
    GenerateVerifiablePresentation,
    RevealCommitment,
    ImportIdentity,
}

/// The user's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
}

/// A consent question awaiting its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    /// Queue-assigned identifier the surface resolves against.
    pub id: String,
    /// What is being asked.
    pub kind: RequestKind,
    /// The payload the asking handler parked.
    pub payload: Value,
    /// Origin of the page that triggered the question, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Surface window currently showing this request, once open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u64>,
}
