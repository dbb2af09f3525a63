//! Inbound adapters: calls from the sidecar into the application.

pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{ServerInvoker, ServerPubSub};
use crate::models::Subscription;
use self::http::HttpServer;

/// What a subscription route answers when its callback fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubSubAckPolicy {
    /// Acknowledge anyway; the failure is only logged.
    #[default]
    Always,
    /// Answer 500 so the sidecar redelivers.
    RetryOnError,
}

/// Settings of the HTTP server the sidecar calls into.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppServerConfig {
    pub host: String,
    pub port: u16,
    /// Request body limit in bytes.
    pub max_body_size: usize,
    pub pubsub_ack: PubSubAckPolicy,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            max_body_size: 4 * 1024 * 1024,
            pubsub_ack: PubSubAckPolicy::default(),
        }
    }
}

impl AppServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Invoker and pub/sub adapters sharing one HTTP server.
#[derive(Clone)]
pub struct SidecarServer {
    http: Arc<HttpServer>,
}

impl SidecarServer {
    #[must_use]
    pub fn new(config: AppServerConfig) -> Self {
        Self {
            http: Arc::new(HttpServer::new(config)),
        }
    }

    #[must_use]
    pub fn invoker(&self) -> &dyn ServerInvoker {
        self.http.as_ref()
    }

    #[must_use]
    pub fn pubsub(&self) -> &dyn ServerPubSub {
        self.http.as_ref()
    }

    #[must_use]
    pub fn http(&self) -> &Arc<HttpServer> {
        &self.http
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.http.subscriptions()
    }

    /// Bind the configured address and serve until `cancel` fires.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn serve(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.http.serve(cancel).await
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
        self.http.serve_with_listener(listener, cancel).await
    }

    /// Bind an ephemeral or configured port and serve in a background task.
    ///
    /// Returns the bound address and the task handle.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn spawn(
        &self,
        cancel: CancellationToken,
    ) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<anyhow::Result<()>>)> {
        let listener = self.http.bind().await?;
        let addr = listener.local_addr()?;
        let http = Arc::clone(&self.http);
        let handle = tokio::spawn(async move { http.serve_with_listener(listener, cancel).await });
        Ok((addr, handle))
    }
}

impl std::fmt::Debug for SidecarServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarServer")
            .field("config", self.http.config())
            .finish_non_exhaustive()
    }
}
