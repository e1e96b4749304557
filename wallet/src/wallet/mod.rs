//! # Wallet
//!
//! The background side assembled: the service owning storage,
//! identities, groups, credentials, and the proof services; the lock
//! gate every sensitive call waits behind; and the capped operation
//! history.

mod history;
mod lock;
mod service;

pub use history::{HistoryEntry, HistoryLog};
pub use lock::{LockGate, UnlockMiddleware};
pub use service::{ConnectedHost, MethodHandler, WalletService};
