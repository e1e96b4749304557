//! # Background Bridge
//!
//! The trust-boundary entry point on the privileged side. Raw values
//! arrive from the messaging substrate; the bridge decides, per value,
//! whether it is an [`Envelope`] addressed to the background at all,
//! parses the wire method name into the closed [`RpcMethod`] set, and
//! runs the router pipeline. Whatever the pipeline produces — result or
//! error — goes back as a reply envelope under the caller's nonce.
//!
//! Parse failures and misaddressed traffic are dropped, not answered:
//! an attacker probing the boundary with garbage learns nothing.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{TARGET_BACKGROUND, TARGET_INJECTED};
use crate::router::{HandlerRouter, RequestMeta, RpcRequest};
use crate::rpc::{Envelope, RpcMessage, RpcMethod};

/// Accepts raw inbound values and answers with reply envelopes.
pub struct BackgroundBridge {
    router: Arc<HandlerRouter>,
}

impl BackgroundBridge {
    pub fn new(router: Arc<HandlerRouter>) -> Self {
        Self { router }
    }

    /// Handle one raw inbound value.
    ///
    /// Returns the reply envelope to forward to the injected side, or
    /// `None` when the value was not a well-formed envelope for us.
    pub async fn handle(&self, raw: Value) -> Option<Envelope> {
        let envelope: Envelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping unparseable inbound message");
                return None;
            }
        };

        if envelope.target != TARGET_BACKGROUND {
            debug!(target = %envelope.target, "ignoring envelope for another side");
            return None;
        }

        let nonce = envelope.nonce;
        let wire_method = envelope.message.method;

        // The closed-set check happens before any routing: an unknown
        // wire name gets an error reply, never a handler.
        let result = match RpcMethod::from_str(&wire_method) {
            Ok(method) => {
                let meta = envelope
                    .message
                    .meta
                    .and_then(|meta| serde_json::from_value::<RequestMeta>(meta).ok())
                    .unwrap_or_default();
                self.router
                    .dispatch(RpcRequest {
                        method,
                        payload: envelope.message.payload.unwrap_or(Value::Null),
                        meta,
                    })
                    .await
            }
            Err(err) => Err(err),
        };

        let message = match result {
            Ok(payload) => RpcMessage {
                method: wire_method,
                payload: Some(payload),
                error: false,
                meta: None,
            },
            Err(err) => RpcMessage {
                method: wire_method,
                payload: Some(Value::String(err.to_string())),
                error: true,
                meta: None,
            },
        };

        Some(Envelope {
            target: TARGET_INJECTED.to_string(),
            nonce,
            message,
        })
    }
}
