use std::time::Duration;

use thiserror::Error;

/// Failure to establish or complete a call against the sidecar.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Endpoint URI could not be turned into a gRPC endpoint
    #[error("invalid sidecar endpoint '{uri}': {source}")]
    InvalidEndpoint {
        uri: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// Connection could not be established, retries included
    #[error("failed to connect to sidecar at {uri} after {attempts} attempts: {source}")]
    Connect {
        uri: String,
        attempts: u32,
        #[source]
        source: tonic::transport::Error,
    },

    /// The remote call completed with a non-OK gRPC status
    #[error("gRPC call {method} failed: {status}")]
    Rpc {
        method: &'static str,
        status: Box<tonic::Status>,
    },

    /// Configured API token is not a valid header value
    #[error("API token is not a valid header value")]
    InvalidApiToken,

    /// HTTP request could not be built
    #[error("failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Network-level HTTP failure
    #[error("HTTP request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Sidecar answered with a non-2xx status
    #[error("HTTP {status} from {path}: {body_preview}")]
    HttpStatus {
        path: String,
        status: http::StatusCode,
        body_preview: String,
    },

    /// No response within the configured request timeout
    #[error("request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    /// JSON encoding or decoding failed
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Wrap a non-OK status returned by the named RPC.
    #[must_use]
    pub fn rpc(method: &'static str, status: tonic::Status) -> Self {
        Self::Rpc {
            method,
            status: Box::new(status),
        }
    }

    /// gRPC status code when the failure came from a completed RPC.
    #[must_use]
    pub fn grpc_code(&self) -> Option<tonic::Code> {
        match self {
            Self::Rpc { status, .. } => Some(status.code()),
            _ => None,
        }
    }

    /// HTTP status when the sidecar answered with a non-2xx status.
    #[must_use]
    pub fn http_status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
