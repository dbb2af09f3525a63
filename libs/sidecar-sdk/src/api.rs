//! Capability traits implemented by the client and server adapters.
//!
//! Each trait is object safe, so a transport can be swapped behind
//! `Arc<dyn ...>` without touching call sites.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::SidecarError;
use crate::models::{
    InvokerListenOptions, LockRequest, LockResult, Subscription, UnlockRequest, UnlockResult,
};
use crate::server::http::InvokeRequest;

/// Handler for an exposed method.
///
/// `Ok(Some(v))` is sent as JSON, `Ok(None)` as `{"closed":true}`. An error
/// becomes a 500 unless the callback already ended the response through
/// [`InvokeRequest::writer`].
pub type InvokerCallback =
    Arc<dyn Fn(InvokeRequest) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// Handler for messages delivered on a topic. Receives the `data` field of
/// the delivered event.
pub type PubSubCallback = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Box an async closure into an [`InvokerCallback`].
pub fn invoker_callback<F, Fut>(f: F) -> InvokerCallback
where
    F: Fn(InvokeRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// Box an async closure into a [`PubSubCallback`].
pub fn pubsub_callback<F, Fut>(f: F) -> PubSubCallback
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |data| f(data).boxed())
}

/// Distributed lock operations.
#[async_trait]
pub trait ClientLock: Send + Sync {
    /// Try to acquire `resource_id` in `store_name` for `lock_owner`.
    ///
    /// # Errors
    /// [`SidecarError::InvalidArgument`] for unusable arguments (checked
    /// before any I/O), [`SidecarError::Transport`] when the call fails.
    async fn try_lock(&self, request: LockRequest) -> Result<LockResult, SidecarError>;

    /// Release a lock held by `lock_owner`.
    ///
    /// # Errors
    /// Same as [`ClientLock::try_lock`].
    async fn unlock(&self, request: UnlockRequest) -> Result<UnlockResult, SidecarError>;
}

/// Sidecar liveness probe.
#[async_trait]
pub trait ClientHealth: Send + Sync {
    /// `true` only when the sidecar answered its health endpoint with 2xx.
    async fn is_healthy(&self) -> bool;
}

/// Exposes methods for service invocation by the sidecar.
#[async_trait]
pub trait ServerInvoker: Send + Sync {
    /// Route `{options.method} /{method_name}` to `callback`.
    ///
    /// Registering the same method and path again replaces the handler.
    ///
    /// # Errors
    /// [`SidecarError::InvalidArgument`] if `method_name` is not a usable path.
    async fn listen(
        &self,
        method_name: &str,
        callback: InvokerCallback,
        options: InvokerListenOptions,
    ) -> Result<(), SidecarError>;
}

/// Receives topic deliveries from the sidecar.
#[async_trait]
pub trait ServerPubSub: Send + Sync {
    /// Subscribe `callback` to `topic` on `pubsub_name`.
    ///
    /// `route` defaults to `route-{pubsub_name}-{topic}`. Returns the
    /// subscription as advertised on `GET /dapr/subscribe`.
    ///
    /// # Errors
    /// [`SidecarError::InvalidArgument`] for an empty name or an unusable route.
    async fn subscribe(
        &self,
        pubsub_name: &str,
        topic: &str,
        callback: PubSubCallback,
        route: Option<&str>,
    ) -> Result<Subscription, SidecarError>;
}
