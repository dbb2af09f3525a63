//! HTTP server the sidecar delivers invocations and topic messages to.
//!
//! Routes live in a table guarded by a mutex. Every registration rebuilds the
//! axum router from the table and swaps it in, so handlers registered after
//! the server started are served by the next request.

mod invoker;
mod pubsub;

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{MethodRouter, get};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use invoker::{InvokeMetadata, InvokeRequest, ResponseWriter};

use super::AppServerConfig;
use crate::api::{InvokerCallback, PubSubCallback, ServerInvoker, ServerPubSub};
use crate::error::SidecarError;
use crate::models::{HttpMethod, InvokerListenOptions, Subscription};

/// Path the sidecar reads the subscription list from.
pub const SUBSCRIBE_PATH: &str = "/dapr/subscribe";

type RouteHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Default)]
struct RouteTable {
    handlers: BTreeMap<String, BTreeMap<HttpMethod, RouteHandler>>,
    subscriptions: BTreeMap<(String, String), Subscription>,
}

impl RouteTable {
    fn insert(&mut self, method: HttpMethod, path: String, handler: RouteHandler) {
        let replaced = self
            .handlers
            .entry(path.clone())
            .or_default()
            .insert(method, handler)
            .is_some();
        if replaced {
            tracing::debug!(%method, %path, "replaced existing route handler");
        }
    }

    fn remove(&mut self, method: HttpMethod, path: &str) {
        if let Some(methods) = self.handlers.get_mut(path) {
            methods.remove(&method);
            if methods.is_empty() {
                self.handlers.remove(path);
            }
        }
    }

    fn build_router(&self, max_body_size: usize) -> Router {
        let subscriptions: Arc<Vec<Subscription>> =
            Arc::new(self.subscriptions.values().cloned().collect());
        let mut router = Router::new().route(
            SUBSCRIBE_PATH,
            get(move || {
                let subscriptions = Arc::clone(&subscriptions);
                async move { Json(subscriptions.as_ref().clone()) }
            }),
        );

        for (path, methods) in &self.handlers {
            let mut method_router = MethodRouter::new();
            for (method, handler) in methods {
                let handler = Arc::clone(handler);
                method_router = method_router.on(method.filter(), move |req: Request| handler(req));
            }
            router = router.route(path, method_router);
        }

        router
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(DefaultBodyLimit::max(max_body_size))
            .layer(TraceLayer::new_for_http())
    }
}

/// HTTP implementation of [`ServerInvoker`] and [`ServerPubSub`].
pub struct HttpServer {
    config: AppServerConfig,
    routes: Mutex<RouteTable>,
    router: Arc<ArcSwap<Router>>,
}

impl HttpServer {
    #[must_use]
    pub fn new(config: AppServerConfig) -> Self {
        let table = RouteTable::default();
        let router = Arc::new(ArcSwap::from_pointee(
            table.build_router(config.max_body_size),
        ));
        Self {
            config,
            routes: Mutex::new(table),
            router,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppServerConfig {
        &self.config
    }

    /// Registered subscriptions, one per (pubsub, topic).
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.routes.lock().subscriptions.values().cloned().collect()
    }

    /// Router that always dispatches to the latest route table.
    #[must_use]
    pub fn router(&self) -> Router {
        let live = Arc::clone(&self.router);
        Router::new().fallback(move |req: Request| {
            let current = live.load_full();
            async move {
                match current.as_ref().clone().oneshot(req).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }
        })
    }

    pub(crate) async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind app server on {addr}"))
    }

    /// Bind the configured address and serve until `cancel` fires.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn serve(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve_with_listener(listener, cancel).await
    }

    /// Serve on an already bound listener until `cancel` fires.
    ///
    /// # Errors
    /// Returns an error if the server fails.
    pub async fn serve_with_listener(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "app server listening for sidecar calls");

        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("app server shutting down gracefully (cancellation)");
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    fn install(&self, method: HttpMethod, path: String, handler: RouteHandler) {
        let mut table = self.routes.lock();
        table.insert(method, path, handler);
        self.router
            .store(Arc::new(table.build_router(self.config.max_body_size)));
    }

    fn install_subscription(&self, subscription: Subscription, handler: RouteHandler) {
        let mut table = self.routes.lock();
        let path = subscription.path();
        table.insert(HttpMethod::Post, path.clone(), handler);
        let previous = table.subscriptions.insert(
            (
                subscription.pubsub_name.clone(),
                subscription.topic.clone(),
            ),
            subscription,
        );

        // A topic moved to a new route stops being served on the old one.
        if let Some(previous) = previous {
            let old_path = previous.path();
            let still_used = table.subscriptions.values().any(|s| s.path() == old_path);
            if old_path != path && !still_used {
                tracing::debug!(path = %old_path, "dropping route of replaced subscription");
                table.remove(HttpMethod::Post, &old_path);
            }
        }
        self.router
            .store(Arc::new(table.build_router(self.config.max_body_size)));
    }
}

#[async_trait]
impl ServerInvoker for HttpServer {
    async fn listen(
        &self,
        method_name: &str,
        callback: InvokerCallback,
        options: InvokerListenOptions,
    ) -> Result<(), SidecarError> {
        let path = route_path(method_name)?;
        let handler = invoker::handler(Arc::from(&path[1..]), callback);
        self.install(options.method, path.clone(), handler);
        tracing::info!("Listening on {} {}", options.method, path);
        Ok(())
    }
}

#[async_trait]
impl ServerPubSub for HttpServer {
    async fn subscribe(
        &self,
        pubsub_name: &str,
        topic: &str,
        callback: PubSubCallback,
        route: Option<&str>,
    ) -> Result<Subscription, SidecarError> {
        if pubsub_name.is_empty() || topic.is_empty() {
            return Err(SidecarError::InvalidArgument(
                "pubsub name and topic must not be empty".to_owned(),
            ));
        }
        let subscription = Subscription::new(pubsub_name, topic, route);
        let path = route_path(&subscription.route)?;

        let handler = pubsub::handler(subscription.clone(), callback, self.config.pubsub_ack);
        self.install_subscription(subscription.clone(), handler);
        tracing::info!(
            pubsub = pubsub_name,
            topic,
            route = %path,
            "subscribed to topic"
        );
        Ok(subscription)
    }
}

/// Turn a method name or route into an absolute path axum accepts as a
/// literal route.
fn route_path(name: &str) -> Result<String, SidecarError> {
    let trimmed = name.trim_start_matches('/');
    let invalid = |reason: &str| {
        Err(SidecarError::InvalidArgument(format!(
            "invalid route '{name}': {reason}"
        )))
    };

    if trimmed.is_empty() {
        return invalid("empty");
    }
    if trimmed.contains(['{', '}']) {
        return invalid("braces are not allowed");
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment.starts_with([':', '*']))
    {
        return invalid("empty or wildcard segment");
    }
    let path = format!("/{trimmed}");
    if path == SUBSCRIBE_PATH || path.starts_with("/dapr/") {
        return invalid("reserved for the sidecar");
    }
    Ok(path)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "callback panicked".to_owned()
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}
