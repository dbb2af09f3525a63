#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Transport handles for the sidecar runtime.
//!
//! Both handles wrap a connection that is established lazily on first use and
//! reused for the lifetime of the handle:
//! - [`GrpcTransport`] owns a `tonic` channel to the sidecar's gRPC port
//! - [`HttpTransport`] owns a pooled `hyper` client for the sidecar's HTTP port
//!
//! Initialization runs at most once; concurrent first callers await the same
//! attempt. A failed attempt leaves the handle empty so the next call retries.
//!
//! # Example
//!
//! ```ignore
//! use sidecar_transport::{GrpcTransport, HttpTransport, SidecarConfig};
//!
//! let cfg = SidecarConfig::default();
//! let grpc = GrpcTransport::from_config(&cfg)?;
//! let http = HttpTransport::from_config(&cfg)?;
//!
//! let channel = grpc.channel().await?;
//! let reply = http.execute(http::Method::GET, "/v1.0/healthz", None).await?;
//! ```

mod config;
mod error;
pub mod grpc;
pub mod http_client;

pub use config::{ApiToken, SidecarConfig};
pub use error::TransportError;
pub use grpc::{GrpcClientConfig, GrpcTransport};
pub use http_client::{HttpReply, HttpTransport};

/// Header (and gRPC metadata key) carrying the sidecar API token.
pub const API_TOKEN_HEADER: &str = "dapr-api-token";
