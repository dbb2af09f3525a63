use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use sidecar_transport::HttpTransport;

use crate::api::ClientHealth;

const HEALTHZ: &str = "/v1.0/healthz";

/// [`ClientHealth`] backed by `GET /v1.0/healthz`.
pub struct HttpClientHealth {
    transport: Arc<HttpTransport>,
}

impl HttpClientHealth {
    #[must_use]
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ClientHealth for HttpClientHealth {
    async fn is_healthy(&self) -> bool {
        match self.transport.execute(Method::GET, HEALTHZ, None).await {
            Ok(reply) => {
                tracing::trace!(status = reply.status.as_u16(), "sidecar is healthy");
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "sidecar health check failed");
                false
            }
        }
    }
}
