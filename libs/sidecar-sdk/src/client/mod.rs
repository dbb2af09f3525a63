//! Outbound adapters: calls from the application into the sidecar.

pub mod grpc;
pub mod http;

use std::sync::Arc;

use serde::Deserialize;
use sidecar_transport::{GrpcTransport, HttpTransport, SidecarConfig};

use crate::api::{ClientHealth, ClientLock};
use crate::error::SidecarError;

/// Which sidecar API the lock adapter talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockProtocol {
    #[default]
    Grpc,
    Http,
}

/// Lock and health adapters wired to one sidecar.
#[derive(Clone)]
pub struct SidecarClient {
    lock: Arc<dyn ClientLock>,
    health: Arc<dyn ClientHealth>,
}

impl SidecarClient {
    #[must_use]
    pub fn new(lock: Arc<dyn ClientLock>, health: Arc<dyn ClientHealth>) -> Self {
        Self { lock, health }
    }

    /// Wire the adapters to the sidecar described by `cfg`.
    ///
    /// No connection is made here; the transports connect on first use.
    ///
    /// # Errors
    /// Returns [`SidecarError::Transport`] if the configured API token is unusable.
    pub fn from_config(cfg: &SidecarConfig, protocol: LockProtocol) -> Result<Self, SidecarError> {
        let http = Arc::new(HttpTransport::from_config(cfg)?);
        let lock: Arc<dyn ClientLock> = match protocol {
            LockProtocol::Grpc => Arc::new(grpc::GrpcClientLock::new(Arc::new(
                GrpcTransport::from_config(cfg)?,
            ))),
            LockProtocol::Http => Arc::new(http::HttpClientLock::new(Arc::clone(&http))),
        };
        tracing::debug!(
            http = %cfg.http_endpoint(),
            grpc = %cfg.grpc_endpoint(),
            ?protocol,
            "sidecar client configured"
        );
        Ok(Self {
            lock,
            health: Arc::new(http::HttpClientHealth::new(http)),
        })
    }

    #[must_use]
    pub fn lock(&self) -> &dyn ClientLock {
        self.lock.as_ref()
    }

    #[must_use]
    pub fn health(&self) -> &dyn ClientHealth {
        self.health.as_ref()
    }
}

impl std::fmt::Debug for SidecarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarClient").finish_non_exhaustive()
    }
}
