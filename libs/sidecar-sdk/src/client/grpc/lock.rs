//! Lock adapter over the sidecar's gRPC API.

use std::sync::Arc;

use async_trait::async_trait;
use sidecar_transport::{GrpcTransport, TransportError};

use crate::api::ClientLock;
use crate::error::SidecarError;
use crate::models::{LockRequest, LockResult, LockStatus, UnlockRequest, UnlockResult};
use crate::proto;
use crate::proto::dapr_client::DaprClient;

/// The two lock RPCs, separated from the channel so the adapter's mapping
/// can run against an in-process stub.
#[async_trait]
pub trait LockRpc: Send + Sync {
    async fn try_lock(
        &self,
        request: proto::TryLockRequest,
    ) -> Result<proto::TryLockResponse, TransportError>;

    async fn unlock(
        &self,
        request: proto::UnlockRequest,
    ) -> Result<proto::UnlockResponse, TransportError>;
}

#[async_trait]
impl LockRpc for GrpcTransport {
    async fn try_lock(
        &self,
        request: proto::TryLockRequest,
    ) -> Result<proto::TryLockResponse, TransportError> {
        let mut client = DaprClient::new(self.channel().await?);
        client
            .try_lock_alpha1(self.request(request))
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| TransportError::rpc("TryLockAlpha1", status))
    }

    async fn unlock(
        &self,
        request: proto::UnlockRequest,
    ) -> Result<proto::UnlockResponse, TransportError> {
        let mut client = DaprClient::new(self.channel().await?);
        client
            .unlock_alpha1(self.request(request))
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| TransportError::rpc("UnlockAlpha1", status))
    }
}

/// [`ClientLock`] backed by `TryLockAlpha1` / `UnlockAlpha1`.
pub struct GrpcClientLock<R: LockRpc = GrpcTransport> {
    rpc: Arc<R>,
}

impl<R: LockRpc> GrpcClientLock<R> {
    #[must_use]
    pub fn new(rpc: Arc<R>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl<R: LockRpc + 'static> ClientLock for GrpcClientLock<R> {
    async fn try_lock(&self, request: LockRequest) -> Result<LockResult, SidecarError> {
        request.validate()?;
        tracing::debug!(
            store = %request.store_name,
            resource = %request.resource_id,
            expiry_secs = request.expiry_in_seconds,
            "try_lock via gRPC"
        );

        let response = self.rpc.try_lock((&request).into()).await?;
        Ok(LockResult {
            success: response.success,
        })
    }

    async fn unlock(&self, request: UnlockRequest) -> Result<UnlockResult, SidecarError> {
        request.validate()?;
        tracing::debug!(
            store = %request.store_name,
            resource = %request.resource_id,
            "unlock via gRPC"
        );

        let response = self.rpc.unlock((&request).into()).await?;
        let status = LockStatus::from_code(response.status);
        if status == LockStatus::InternalError {
            tracing::warn!(code = response.status, "sidecar reported unlock failure");
        }
        Ok(UnlockResult { status })
    }
}
