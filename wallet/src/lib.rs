//! # Aegis Wallet — Core Library
//!
//! Aegis is a browser-extension wallet that holds zero-knowledge identities
//! on a user's behalf and mediates every request an untrusted web page makes
//! against them. This crate is the privileged core: the message protocol,
//! the dispatch pipeline, the consent state machine, and the identity/proof
//! services those requests ultimately invoke. The rendered UI, browser
//! window lifecycle, and the proving systems themselves live outside the
//! crate, behind traits.
//!
//! ## Architecture
//!
//! The modules mirror the actual concerns of the mediation layer, leaf to
//! root:
//!
//! - **storage** — Durable, keyed persistence. Opaque JSON blobs in, out.
//! - **identity** — The zero-knowledge identity model and its factory.
//! - **proof** — Merkle-source validation plus the Semaphore and RLN proof
//!   services that drive an opaque external prover.
//! - **router** — `method → middleware chain → handler` registration and
//!   dispatch for inbound calls.
//! - **approval** — Pending requests that must not complete without the
//!   user saying yes, and the popup surface that asks them.
//! - **rpc** — The nonce-correlated envelope protocol across the
//!   page/background trust boundary, plus the page-side injected client.
//! - **group** — Group membership and group merkle inclusion proofs.
//! - **vc** — Verifiable credentials and presentations.
//! - **wallet** — The top-level service that wires everything together.
//!
//! ## Design Philosophy
//!
//! 1. Nothing sensitive executes without explicit consent. The approval
//!    queue is not decorative.
//! 2. Errors cross the trust boundary as data (`error: true` envelopes),
//!    never as exceptions. Malformed traffic is dropped, not crashed on.
//! 3. No ambient globals. Every service is constructed once and handed to
//!    its consumers, so tests can build isolated instances.

pub mod approval;
pub mod config;
pub mod error;
pub mod group;
pub mod identity;
pub mod proof;
pub mod router;
pub mod rpc;
pub mod storage;
pub mod vc;
pub mod wallet;

pub use error::{Error, Result};
