//! Lock adapter over the sidecar's HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use sidecar_transport::HttpTransport;

use crate::api::ClientLock;
use crate::error::SidecarError;
use crate::models::{LockRequest, LockResult, LockStatus, UnlockRequest, UnlockResult};

const LOCK_API: &str = "/v1.0-alpha1/lock";
const UNLOCK_API: &str = "/v1.0-alpha1/unlock";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TryLockBody<'a> {
    resource_id: &'a str,
    lock_owner: &'a str,
    expiry_in_seconds: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlockBody<'a> {
    resource_id: &'a str,
    lock_owner: &'a str,
}

#[derive(Deserialize)]
struct TryLockReply {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct UnlockReply {
    #[serde(default)]
    status: i32,
}

/// [`ClientLock`] backed by `POST /v1.0-alpha1/{lock,unlock}/{store}`.
pub struct HttpClientLock {
    transport: Arc<HttpTransport>,
}

impl HttpClientLock {
    #[must_use]
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self { transport }
    }
}

fn store_path(api: &str, store_name: &str) -> String {
    format!("{api}/{}", urlencoding::encode(store_name))
}

#[async_trait]
impl ClientLock for HttpClientLock {
    async fn try_lock(&self, request: LockRequest) -> Result<LockResult, SidecarError> {
        request.validate()?;
        let path = store_path(LOCK_API, &request.store_name);
        tracing::debug!(%path, resource = %request.resource_id, "try_lock via HTTP");

        let body = TryLockBody {
            resource_id: &request.resource_id,
            lock_owner: &request.lock_owner,
            expiry_in_seconds: request.expiry_in_seconds,
        };
        let reply: TryLockReply = self
            .transport
            .execute_json(Method::POST, &path, &body)
            .await?;
        Ok(LockResult {
            success: reply.success,
        })
    }

    async fn unlock(&self, request: UnlockRequest) -> Result<UnlockResult, SidecarError> {
        request.validate()?;
        let path = store_path(UNLOCK_API, &request.store_name);
        tracing::debug!(%path, resource = %request.resource_id, "unlock via HTTP");

        let body = UnlockBody {
            resource_id: &request.resource_id,
            lock_owner: &request.lock_owner,
        };
        let reply: UnlockReply = self
            .transport
            .execute_json(Method::POST, &path, &body)
            .await?;
        Ok(UnlockResult {
            status: LockStatus::from_code(reply.status),
        })
    }
}
