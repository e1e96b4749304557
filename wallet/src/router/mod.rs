//! # Handler Router
//!
//! `method → middleware chain → handler`, registered once at startup and
//! dispatched for every inbound call. The chain is an explicit ordered
//! pipeline: each middleware receives the payload its predecessor
//! produced, may suspend (waiting on storage, the approval queue, a lock
//! gate), may abort by failing, and hands the next payload on. The
//! terminal handler's output is the dispatch result.
//!
//! The routing table is keyed by the closed [`RpcMethod`] enum, not by
//! strings — a chain can only be registered for a method that exists, and
//! duplicate registration is refused at registration time rather than
//! discovered in production.
//!
//! The router itself holds no other state. Any number of dispatches may
//! be in flight at once; whatever serialization individual middlewares
//! impose (the approval queue's single surface, per-key storage order) is
//! their business, not the router's.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::rpc::RpcMethod;
use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Request & Meta
// ---------------------------------------------------------------------------

/// Caller context that rides alongside the payload through the whole
/// chain. Middlewares read it; only the boundary writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Origin of the calling page, as attested by the injecting side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// A routed inbound call.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Which handler chain to run.
    pub method: RpcMethod,
    /// The initial payload, as sent by the page.
    pub payload: Value,
    /// Caller context.
    pub meta: RequestMeta,
}

// ---------------------------------------------------------------------------
// Pipeline Traits
// ---------------------------------------------------------------------------

/// A stage in a method's pipeline. Receives the current payload, returns
/// the next one, or fails and aborts the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Transform (or gate) the payload.
    async fn apply(&self, payload: Value, meta: &RequestMeta) -> Result<Value>;
}

/// The terminal stage of a pipeline.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Perform the operation and produce the dispatch result.
    async fn call(&self, payload: Value, meta: &RequestMeta) -> Result<Value>;
}

/// Adapter for plain synchronous payload transforms.
pub struct MiddlewareFn<F>(pub F);

#[async_trait]
impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(Value, &RequestMeta) -> Result<Value> + Send + Sync,
{
    async fn apply(&self, payload: Value, meta: &RequestMeta) -> Result<Value> {
        (self.0)(payload, meta)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Route {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

/// The registration table and dispatcher.
#[derive(Default)]
pub struct HandlerRouter {
    routes: RwLock<HashMap<RpcMethod, Route>>,
}

impl HandlerRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pipeline for `method`. Middlewares run in the order
    /// given. Registering a method twice is a wiring bug and is refused.
    pub fn register(
        &self,
        method: RpcMethod,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        let mut routes = self.routes.write();
        if routes.contains_key(&method) {
            return Err(Error::Protocol(format!("{method} is already registered")));
        }
        routes.insert(
            method,
            Route {
                middlewares,
                handler,
            },
        );
        Ok(())
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Run the pipeline for a request.
    ///
    /// The route is cloned out of the table up front so the table lock is
    /// never held across a suspension point.
    pub async fn dispatch(&self, request: RpcRequest) -> Result<Value> {
        let route = self
            .routes
            .read()
            .get(&request.method)
            .cloned()
            .ok_or_else(|| Error::MethodNotFound(request.method.to_string()))?;

        debug!(method = %request.method, stages = route.middlewares.len(), "dispatching");

        let mut payload = request.payload;
        for middleware in &route.middlewares {
            payload = middleware.apply(payload, &request.meta).await?;
        }
        route.handler.call(payload, &request.meta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adds a constant to an integer payload, counting invocations.
    struct AddStage {
        amount: i64,
        calls: Arc<AtomicUsize>,
    }

    impl AddStage {
        fn new(amount: i64) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    amount,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl Middleware for AddStage {
        async fn apply(&self, payload: Value, _meta: &RequestMeta) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = payload.as_i64().expect("integer payload");
            Ok(json!(n + self.amount))
        }
    }

    struct AddHandler(i64);

    #[async_trait]
    impl Handler for AddHandler {
        async fn call(&self, payload: Value, _meta: &RequestMeta) -> Result<Value> {
            let n = payload.as_i64().expect("integer payload");
            Ok(json!(n + self.0))
        }
    }

    fn request(method: RpcMethod, payload: Value) -> RpcRequest {
        RpcRequest {
            method,
            payload,
            meta: RequestMeta::default(),
        }
    }

    #[tokio::test]
    async fn middlewares_thread_in_registration_order() {
        let router = HandlerRouter::new();
        let (m1, c1) = AddStage::new(1);
        let (m2, c2) = AddStage::new(2);
        let (m3, c3) = AddStage::new(3);

        router
            .register(
                RpcMethod::Connect,
                vec![m1, m2, m3],
                Arc::new(AddHandler(4)),
            )
            .unwrap();

        let result = router
            .dispatch(request(RpcMethod::Connect, json!(0)))
            .await
            .unwrap();

        assert_eq!(result, json!(10));
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_method_is_not_detected() {
        let router = HandlerRouter::new();
        let err = router
            .dispatch(request(RpcMethod::JoinGroup, json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "join-group is not detected");
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let router = HandlerRouter::new();
        router
            .register(RpcMethod::Connect, vec![], Arc::new(AddHandler(0)))
            .unwrap();
        assert!(router
            .register(RpcMethod::Connect, vec![], Arc::new(AddHandler(0)))
            .is_err());
        assert_eq!(router.len(), 1);
    }

    #[tokio::test]
    async fn failing_middleware_aborts_the_chain() {
        let router = HandlerRouter::new();
        let (counted, calls) = AddStage::new(1);

        let reject = Arc::new(MiddlewareFn(|_payload: Value, _meta: &RequestMeta| {
            Err(Error::ApprovalRejected)
        }));

        router
            .register(
                RpcMethod::Connect,
                vec![reject, counted],
                Arc::new(AddHandler(0)),
            )
            .unwrap();

        let err = router
            .dispatch(request(RpcMethod::Connect, json!(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ApprovalRejected));
        // The downstream middleware never ran.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn meta_is_visible_to_every_stage() {
        let router = HandlerRouter::new();
        let stamp = Arc::new(MiddlewareFn(|payload: Value, meta: &RequestMeta| {
            let origin = meta.origin.clone().unwrap_or_default();
            Ok(json!({ "origin": origin, "inner": payload }))
        }));

        struct EchoHandler;
        #[async_trait]
        impl Handler for EchoHandler {
            async fn call(&self, payload: Value, _meta: &RequestMeta) -> Result<Value> {
                Ok(payload)
            }
        }

        router
            .register(RpcMethod::Connect, vec![stamp], Arc::new(EchoHandler))
            .unwrap();

        let result = router
            .dispatch(RpcRequest {
                method: RpcMethod::Connect,
                payload: json!(7),
                meta: RequestMeta {
                    origin: Some("example.org".into()),
                },
            })
            .await
            .unwrap();

        assert_eq!(result["origin"], "example.org");
        assert_eq!(result["inner"], 7);
    }

    #[tokio::test]
    async fn concurrent_dispatches_do_not_interfere() {
        let router = Arc::new(HandlerRouter::new());
        let (m, _) = AddStage::new(10);
        router
            .register(RpcMethod::Connect, vec![m], Arc::new(AddHandler(0)))
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let router = Arc::clone(&router);
            handles.push(tokio::spawn(async move {
                router.dispatch(request(RpcMethod::Connect, json!(i))).await
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), json!(i as i64 + 10));
        }
    }
}
