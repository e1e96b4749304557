//! # RPC Module — the trust boundary
//!
//! The wire between an untrusted page and the privileged background
//! process. Four pieces:
//!
//! ```text
//! envelope.rs — The wire unit: {target, nonce, message} plus the closed
//!               RPC method name-space
//! gateway.rs  — Nonce-correlated request/response matching on the
//!               sending side
//! bridge.rs   — The receiving side: envelope in, dispatch, envelope out
//! client.rs   — The typed facade a page script talks to
//! ```
//!
//! Errors cross this boundary as `error: true` envelopes carrying a
//! human-readable message. Unparseable traffic and orphan nonces are
//! dropped where they land — a malformed message must never take the
//! process down, and must never resolve anyone else's pending call.

pub mod bridge;
pub mod client;
pub mod envelope;
pub mod gateway;

pub use bridge::BackgroundBridge;
pub use client::InjectedClient;
pub use envelope::{Envelope, RpcMessage, RpcMethod};
pub use gateway::{RpcGateway, Transport};
