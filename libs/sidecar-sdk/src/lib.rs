#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Application-side binding for a co-located sidecar.
//!
//! Outbound, [`SidecarClient`] carries the lock and health adapters:
//!
//! ```no_run
//! # async fn demo() -> Result<(), sidecar_sdk::SidecarError> {
//! use sidecar_sdk::{LockProtocol, LockRequest, SidecarClient, SidecarConfig, new_lock_owner};
//!
//! let client = SidecarClient::from_config(&SidecarConfig::default(), LockProtocol::Grpc)?;
//! let acquired = client
//!     .lock()
//!     .try_lock(LockRequest {
//!         store_name: "redis".to_owned(),
//!         resource_id: "order-1".to_owned(),
//!         lock_owner: new_lock_owner(),
//!         expiry_in_seconds: 30,
//!     })
//!     .await?;
//! # let _ = acquired;
//! # Ok(())
//! # }
//! ```
//!
//! Inbound, [`SidecarServer`] exposes methods for service invocation and
//! receives topic deliveries. Routes may be registered before or after the
//! server starts.

pub mod api;
pub mod client;
mod error;
pub mod models;
pub mod proto;
pub mod server;

pub use api::{
    ClientHealth, ClientLock, InvokerCallback, PubSubCallback, ServerInvoker, ServerPubSub,
    invoker_callback, pubsub_callback,
};
pub use client::grpc::{GrpcClientLock, LockRpc};
pub use client::http::{HttpClientHealth, HttpClientLock};
pub use client::{LockProtocol, SidecarClient};
pub use error::SidecarError;
pub use models::{
    HttpMethod, InvokerListenOptions, LockRequest, LockResult, LockStatus, Subscription,
    UnlockRequest, UnlockResult, default_route, new_lock_owner,
};
pub use server::http::{HttpServer, InvokeMetadata, InvokeRequest, ResponseWriter};
pub use server::{AppServerConfig, PubSubAckPolicy, SidecarServer};

pub use sidecar_transport::{SidecarConfig, TransportError};
