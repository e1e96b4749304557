//! The wallet lock.
//!
//! Handlers that touch identity material wait for the wallet to be
//! unlocked instead of failing, so a call made against a locked wallet
//! suspends until the user unlocks and then proceeds. Any number of
//! callers may be waiting; one unlock releases all of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::debug;

use crate::router::{Middleware, RequestMeta};
use crate::Result;

/// Lock state plus the wakeup for everyone waiting on it.
pub struct LockGate {
    unlocked: AtomicBool,
    notify: Notify,
}

impl LockGate {
    /// A gate in the locked state.
    pub fn new() -> Self {
        Self {
            unlocked: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    /// Unlock and wake every waiter.
    pub fn unlock(&self) {
        self.unlocked.store(true, Ordering::Release);
        self.notify.notify_waiters();
        debug!("wallet unlocked");
    }

    pub fn lock(&self) {
        self.unlocked.store(false, Ordering::Release);
        debug!("wallet locked");
    }

    /// Resolve immediately if unlocked, otherwise suspend until the
    /// next unlock.
    pub async fn await_unlock(&self) {
        loop {
            // Arm the wakeup before checking, or an unlock landing
            // between the check and the await would be missed.
            let notified = self.notify.notified();
            if self.is_unlocked() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for LockGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline stage that holds the payload until the wallet is unlocked.
pub struct UnlockMiddleware {
    gate: Arc<LockGate>,
}

impl UnlockMiddleware {
    pub fn new(gate: Arc<LockGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl Middleware for UnlockMiddleware {
    async fn apply(&self, payload: Value, _meta: &RequestMeta) -> Result<Value> {
        self.gate.await_unlock().await;
        Ok(payload)
    }
}
