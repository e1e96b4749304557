//! # RPC Gateway — nonce correlation
//!
//! The sending half of the trust boundary. `send` assigns a fresh nonce,
//! parks a waiter under it, pushes the envelope through the [`Transport`],
//! and hands the caller a future. `receive` matches a response back to its
//! waiter by nonce and wakes it — exactly once, ever.
//!
//! Guarantees, and non-guarantees:
//!
//! - **At most one resolution per nonce.** The waiter is removed from the
//!   table before it is woken; a duplicate response finds nothing.
//! - **No ordering.** Responses land whenever they land; concurrent calls
//!   must not assume send order.
//! - **Orphans are dropped.** A response whose nonce is not in the table
//!   is logged and discarded, with no side effects on anyone else's call.
//!
//! The correlation table is owned by the gateway instance — its lifecycle
//! is the gateway's lifecycle, nothing is process-global.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use super::envelope::{Envelope, RpcMessage};
use crate::{Error, Result};

/// The mechanism that physically moves an envelope across the boundary
/// (postMessage, runtime port, in-process channel in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver an envelope to the other side. Delivery failure fails the
    /// originating call.
    async fn post(&self, envelope: Envelope) -> Result<()>;
}

type Waiter = oneshot::Sender<Result<Value>>;

/// Nonce-correlated request/response gateway.
pub struct RpcGateway {
    /// Target stamped on outbound envelopes (the far side's name).
    remote: String,
    /// Target inbound envelopes must carry to be accepted (our name).
    local: String,
    transport: Arc<dyn Transport>,
    inflight: DashMap<String, Waiter>,
}

impl RpcGateway {
    /// Create a gateway that dials `remote` and accepts responses
    /// addressed to `local`.
    pub fn new(
        remote: impl Into<String>,
        local: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            remote: remote.into(),
            local: local.into(),
            transport,
            inflight: DashMap::new(),
        }
    }

    /// Send a message across the boundary and await its response.
    ///
    /// An `error: true` response rejects with the payload as the error
    /// message; anything else resolves with the payload.
    pub async fn send(&self, message: RpcMessage) -> Result<Value> {
        let nonce = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inflight.insert(nonce.clone(), tx);

        let envelope = Envelope {
            target: self.remote.clone(),
            nonce: nonce.clone(),
            message,
        };

        if let Err(e) = self.transport.post(envelope).await {
            // The call never left; its waiter must not linger.
            self.inflight.remove(&nonce);
            return Err(e);
        }

        rx.await
            .map_err(|_| Error::Protocol("gateway dropped before a response arrived".into()))?
    }

    /// Feed a response envelope in from the other side.
    ///
    /// Envelopes for other targets and nonces with no waiter are dropped
    /// without side effects.
    pub fn receive(&self, envelope: Envelope) {
        if envelope.target != self.local {
            debug!(target = %envelope.target, "envelope for another target, dropped");
            return;
        }

        let Some((_, waiter)) = self.inflight.remove(&envelope.nonce) else {
            debug!(nonce = %envelope.nonce, "response with no matching nonce, dropped");
            return;
        };

        let outcome = if envelope.message.error {
            let detail = envelope
                .message
                .payload
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| "remote error".to_string());
            Err(Error::Rpc(detail))
        } else {
            Ok(envelope.message.payload.unwrap_or(Value::Null))
        };

        // The caller may have given up and dropped its receiver; that is
        // its privilege, not our problem.
        let _ = waiter.send(outcome);
    }

    /// Number of calls currently awaiting a response.
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}
