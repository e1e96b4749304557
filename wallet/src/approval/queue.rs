//! The consent state machine.
//!
//! Requests park here in arrival order. At most one is ever on screen;
//! the rest wait their turn. Every resolution path — explicit verdict,
//! the user closing the window, a surface that fails to open — settles
//! the parked handler exactly once and promotes the next request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::router::{Middleware, RequestMeta};
use crate::{Error, Result};

use super::{ApprovalStatus, ApprovalSurface, PendingRequest, PopupOptions, RequestKind};

type Verdict = (ApprovalStatus, Option<Value>);

struct QueueEntry {
    request: PendingRequest,
    verdict: oneshot::Sender<Verdict>,
}

#[derive(Default)]
struct QueueInner {
    entries: HashMap<String, QueueEntry>,
    /// Waiting ids, arrival order. The active id is not in here.
    order: VecDeque<String>,
    /// The one request currently on screen.
    active: Option<String>,
}

/// FIFO consent queue with a single on-screen request.
pub struct ApprovalQueue {
    surface: Arc<dyn ApprovalSurface>,
    inner: Mutex<QueueInner>,
}

/// A parked handler's handle to its eventual verdict.
pub struct ApprovalAwaiter {
    id: String,
    rx: oneshot::Receiver<Verdict>,
}

impl ApprovalAwaiter {
    /// The queue-assigned request id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the verdict.
    pub async fn verdict(self) -> Result<Verdict> {
        self.rx
            .await
            .map_err(|_| Error::Protocol("approval queue dropped before a verdict".into()))
    }
}

impl ApprovalQueue {
    pub fn new(surface: Arc<dyn ApprovalSurface>) -> Self {
        Self {
            surface,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Park a consent question. The returned awaiter settles when the
    /// question resolves, by whatever path.
    pub async fn enqueue(
        &self,
        kind: RequestKind,
        payload: Value,
        origin: Option<String>,
    ) -> ApprovalAwaiter {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut inner = self.inner.lock();
            inner.entries.insert(
                id.clone(),
                QueueEntry {
                    request: PendingRequest {
                        id: id.clone(),
                        kind,
                        payload,
                        origin,
                        window_id: None,
                    },
                    verdict: tx,
                },
            );
            inner.order.push_back(id.clone());
        }
        debug!(%id, ?kind, "consent request parked");

        self.pump().await;
        ApprovalAwaiter { id, rx }
    }

    /// Settle a parked request with the user's verdict.
    ///
    /// Fails with [`Error::UnknownRequest`] when the id was never issued
    /// or has already resolved; a request settles exactly once.
    pub async fn resolve(
        &self,
        id: &str,
        status: ApprovalStatus,
        data: Option<Value>,
    ) -> Result<()> {
        let (entry, window_id) = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.entries.remove(id) else {
                return Err(Error::UnknownRequest(id.to_string()));
            };
            if inner.active.as_deref() == Some(id) {
                inner.active = None;
            }
            inner.order.retain(|queued| queued != id);
            let window_id = entry.request.window_id;
            (entry, window_id)
        };

        debug!(%id, ?status, "consent request settled");
        // The handler may have stopped waiting; its verdict is still final.
        let _ = entry.verdict.send((status, data));

        if let Some(window_id) = window_id {
            if let Err(err) = self.surface.close(window_id).await {
                warn!(%err, window_id, "failed to close consent window");
            }
        }

        self.pump().await;
        Ok(())
    }

    /// The user closed the consent window without answering. That is a
    /// rejection of whatever the window was showing.
    pub async fn surface_closed(&self, window_id: u64) {
        let active_id = {
            let inner = self.inner.lock();
            inner
                .active
                .as_ref()
                .filter(|id| {
                    inner
                        .entries
                        .get(*id)
                        .is_some_and(|e| e.request.window_id == Some(window_id))
                })
                .cloned()
        };

        if let Some(id) = active_id {
            debug!(%id, window_id, "consent window closed, rejecting");
            let _ = self.resolve(&id, ApprovalStatus::Rejected, None).await;
        }
    }

    /// Snapshot of unresolved requests, on-screen one first.
    pub fn pending(&self) -> Vec<PendingRequest> {
        let inner = self.inner.lock();
        inner
            .active
            .iter()
            .chain(inner.order.iter())
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| entry.request.clone())
            .collect()
    }

    /// Number of unresolved requests.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Put the next waiting request on screen, if the screen is free.
    ///
    /// The surface is always called outside the queue lock.
    async fn pump(&self) {
        loop {
            let next = {
                let mut inner = self.inner.lock();
                if inner.active.is_some() {
                    return;
                }
                // Skip ids that resolved while still waiting.
                let mut promoted = None;
                while let Some(id) = inner.order.pop_front() {
                    if let Some(entry) = inner.entries.get(&id) {
                        promoted = Some(entry.request.clone());
                        inner.active = Some(id);
                        break;
                    }
                }
                match promoted {
                    Some(request) => request,
                    None => return,
                }
            };

            let options = PopupOptions::for_request(&next);
            match self.surface.open(&next, options).await {
                Ok(window_id) => {
                    let stale_window = {
                        let mut inner = self.inner.lock();
                        match inner.entries.get_mut(&next.id) {
                            Some(entry) => {
                                entry.request.window_id = window_id;
                                None
                            }
                            // Settled while the window was opening.
                            None => {
                                if inner.active.as_deref() == Some(next.id.as_str()) {
                                    inner.active = None;
                                }
                                window_id
                            }
                        }
                    };
                    match stale_window {
                        None => return,
                        Some(window_id) => {
                            let _ = self.surface.close(window_id).await;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, id = %next.id, "consent surface failed to open, rejecting");
                    let entry = {
                        let mut inner = self.inner.lock();
                        if inner.active.as_deref() == Some(next.id.as_str()) {
                            inner.active = None;
                        }
                        inner.entries.remove(&next.id)
                    };
                    if let Some(entry) = entry {
                        let _ = entry.verdict.send((ApprovalStatus::Rejected, None));
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Pipeline stage that parks the payload and awaits consent.
///
/// On approval the verdict's data, when present, replaces the payload —
/// the surface can hand the handler what the user actually picked (for
/// instance which identity to connect). On rejection the chain aborts.
pub struct ApprovalMiddleware {
    queue: Arc<ApprovalQueue>,
    kind: RequestKind,
}

impl ApprovalMiddleware {
    pub fn new(queue: Arc<ApprovalQueue>, kind: RequestKind) -> Self {
        Self { queue, kind }
    }
}

#[async_trait]
impl Middleware for ApprovalMiddleware {
    async fn apply(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        let awaiter = self
            .queue
            .enqueue(self.kind, payload.clone(), meta.origin.clone())
            .await;
        match awaiter.verdict().await? {
            (ApprovalStatus::Approved, data) => Ok(data.unwrap_or(payload)),
            (ApprovalStatus::Rejected, _) => Err(Error::ApprovalRejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::NullSurface;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Records which requests were shown and hands out window ids.
    #[derive(Default)]
    struct CountingSurface {
        opened: Mutex<Vec<String>>,
        on_screen: AtomicUsize,
        peak_on_screen: AtomicUsize,
        next_window: AtomicU64,
    }

    #[async_trait]
    impl ApprovalSurface for CountingSurface {
        async fn open(
            &self,
            request: &PendingRequest,
            _options: PopupOptions,
        ) -> Result<Option<u64>> {
            self.opened.lock().push(request.id.clone());
            let now = self.on_screen.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_on_screen.fetch_max(now, Ordering::SeqCst);
            Ok(Some(self.next_window.fetch_add(1, Ordering::SeqCst) + 1))
        }

        async fn close(&self, _window_id: u64) -> Result<()> {
            self.on_screen.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue() -> (Arc<ApprovalQueue>, Arc<CountingSurface>) {
        let surface = Arc::new(CountingSurface::default());
        (
            Arc::new(ApprovalQueue::new(
                Arc::clone(&surface) as Arc<dyn ApprovalSurface>
            )),
            surface,
        )
    }

    #[tokio::test]
    async fn every_request_gets_a_fresh_id() {
        let (queue, _) = queue();
        let a = queue
            .enqueue(RequestKind::Connect, json!(null), None)
            .await;
        let b = queue
            .enqueue(RequestKind::Connect, json!(null), None)
            .await;
        assert_ne!(a.id(), b.id());
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn approval_delivers_the_verdict_data() {
        let (queue, _) = queue();
        let awaiter = queue
            .enqueue(RequestKind::Connect, json!({"asked": true}), None)
            .await;
        let id = awaiter.id().to_string();

        queue
            .resolve(&id, ApprovalStatus::Approved, Some(json!({"picked": "a"})))
            .await
            .unwrap();

        let (status, data) = awaiter.verdict().await.unwrap();
        assert_eq!(status, ApprovalStatus::Approved);
        assert_eq!(data, Some(json!({"picked": "a"})));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn unknown_id_cannot_resolve() {
        let (queue, _) = queue();
        let err = queue
            .resolve("never-issued", ApprovalStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRequest(_)));
    }

    #[tokio::test]
    async fn a_request_settles_exactly_once() {
        let (queue, _) = queue();
        let awaiter = queue
            .enqueue(RequestKind::JoinGroup, json!(null), None)
            .await;
        let id = awaiter.id().to_string();

        queue
            .resolve(&id, ApprovalStatus::Rejected, None)
            .await
            .unwrap();
        let err = queue
            .resolve(&id, ApprovalStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownRequest(_)));
    }

    #[tokio::test]
    async fn one_window_at_a_time_in_arrival_order() {
        let (queue, surface) = queue();
        let first = queue
            .enqueue(RequestKind::Connect, json!(1), None)
            .await;
        let second = queue
            .enqueue(RequestKind::JoinGroup, json!(2), None)
            .await;
        let third = queue
            .enqueue(RequestKind::SemaphoreProof, json!(3), None)
            .await;

        // Only the first is on screen.
        assert_eq!(surface.opened.lock().len(), 1);
        let pending = queue.pending();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].id, first.id());

        queue
            .resolve(first.id(), ApprovalStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(surface.opened.lock().len(), 2);

        queue
            .resolve(second.id(), ApprovalStatus::Rejected, None)
            .await
            .unwrap();
        queue
            .resolve(third.id(), ApprovalStatus::Approved, None)
            .await
            .unwrap();

        let opened = surface.opened.lock().clone();
        assert_eq!(
            opened,
            vec![
                first.id().to_string(),
                second.id().to_string(),
                third.id().to_string()
            ]
        );
        assert_eq!(surface.peak_on_screen.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn closing_the_window_rejects_the_active_request() {
        let (queue, _) = queue();
        let awaiter = queue
            .enqueue(RequestKind::RevealCommitment, json!(null), None)
            .await;

        let window_id = queue.pending()[0].window_id.expect("window assigned");
        queue.surface_closed(window_id).await;

        let (status, _) = awaiter.verdict().await.unwrap();
        assert_eq!(status, ApprovalStatus::Rejected);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn middleware_substitutes_approved_data_and_rejects_cleanly() {
        let (queue, _) = queue();
        let middleware = ApprovalMiddleware::new(Arc::clone(&queue), RequestKind::Connect);
        let meta = RequestMeta {
            origin: Some("https://example.org".into()),
        };

        let pending = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                // Resolve whatever arrives first with substitute data.
                loop {
                    if let Some(request) = queue.pending().first().cloned() {
                        queue
                            .resolve(
                                &request.id,
                                ApprovalStatus::Approved,
                                Some(json!({"commitment": "0xabc"})),
                            )
                            .await
                            .unwrap();
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let out = middleware.apply(json!({"original": true}), &meta).await;
        pending.await.unwrap();
        assert_eq!(out.unwrap(), json!({"commitment": "0xabc"}));

        // Rejection path.
        let meta2 = meta.clone();
        let queue2 = Arc::clone(&queue);
        let rejecter = tokio::spawn(async move {
            loop {
                if let Some(request) = queue2.pending().first().cloned() {
                    queue2
                        .resolve(&request.id, ApprovalStatus::Rejected, None)
                        .await
                        .unwrap();
                    break;
                }
                tokio::task::yield_now().await;
            }
        });
        let err = middleware.apply(json!(null), &meta2).await.unwrap_err();
        rejecter.await.unwrap();
        assert!(matches!(err, Error::ApprovalRejected));
    }

    #[tokio::test]
    async fn null_surface_queue_still_resolves() {
        let queue = ApprovalQueue::new(Arc::new(NullSurface));
        let awaiter = queue
            .enqueue(RequestKind::ImportIdentity, json!(null), None)
            .await;
        let id = awaiter.id().to_string();
        queue
            .resolve(&id, ApprovalStatus::Approved, None)
            .await
            .unwrap();
        let (status, data) = awaiter.verdict().await.unwrap();
        assert_eq!(status, ApprovalStatus::Approved);
        assert_eq!(data, None);
    }
}
