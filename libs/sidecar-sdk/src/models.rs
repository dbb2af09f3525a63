//! SDK-level request and result types.

use std::fmt;
use std::str::FromStr;

use axum::routing::MethodFilter;
use serde::{Deserialize, Serialize};

use crate::error::SidecarError;
use crate::proto;

/// Arguments of a lock acquisition.
///
/// `lock_owner` identifies a single attempt, not the process: two concurrent
/// attempts from the same process must use different owners. See
/// [`new_lock_owner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub store_name: String,
    pub resource_id: String,
    pub lock_owner: String,
    pub expiry_in_seconds: u32,
}

impl LockRequest {
    /// Check that every field is usable on the wire.
    ///
    /// # Errors
    /// Returns [`SidecarError::InvalidArgument`] for an empty field or an
    /// expiry that does not fit the protocol's signed 32-bit field.
    pub fn validate(&self) -> Result<(), SidecarError> {
        require_non_empty("store_name", &self.store_name)?;
        require_non_empty("resource_id", &self.resource_id)?;
        require_non_empty("lock_owner", &self.lock_owner)?;
        if i32::try_from(self.expiry_in_seconds).is_err() {
            return Err(SidecarError::InvalidArgument(format!(
                "expiry_in_seconds {} exceeds {}",
                self.expiry_in_seconds,
                i32::MAX
            )));
        }
        Ok(())
    }
}

impl From<&LockRequest> for proto::TryLockRequest {
    fn from(req: &LockRequest) -> Self {
        Self {
            store_name: req.store_name.clone(),
            resource_id: req.resource_id.clone(),
            lock_owner: req.lock_owner.clone(),
            expiry_in_seconds: i32::try_from(req.expiry_in_seconds).unwrap_or(i32::MAX),
        }
    }
}

/// Arguments of a lock release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockRequest {
    pub store_name: String,
    pub resource_id: String,
    pub lock_owner: String,
}

impl UnlockRequest {
    /// # Errors
    /// Returns [`SidecarError::InvalidArgument`] for an empty field.
    pub fn validate(&self) -> Result<(), SidecarError> {
        require_non_empty("store_name", &self.store_name)?;
        require_non_empty("resource_id", &self.resource_id)?;
        require_non_empty("lock_owner", &self.lock_owner)
    }
}

impl From<&UnlockRequest> for proto::UnlockRequest {
    fn from(req: &UnlockRequest) -> Self {
        Self {
            store_name: req.store_name.clone(),
            resource_id: req.resource_id.clone(),
            lock_owner: req.lock_owner.clone(),
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SidecarError> {
    if value.is_empty() {
        return Err(SidecarError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

/// Fresh owner token for a single lock attempt.
#[must_use]
pub fn new_lock_owner() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResult {
    pub success: bool,
}

/// Outcome of a lock release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockStatus {
    Success,
    LockDoesNotExist,
    LockBelongToOthers,
    InternalError,
}

impl LockStatus {
    /// Map a wire status code. Unknown codes map to `InternalError`.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        use proto::unlock_response::Status;

        match Status::try_from(code) {
            Ok(Status::Success) => Self::Success,
            Ok(Status::LockUnexist) => Self::LockDoesNotExist,
            Ok(Status::LockBelongToOthers) => Self::LockBelongToOthers,
            Ok(Status::InternalError) | Err(_) => Self::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResult {
    pub status: LockStatus,
}

/// HTTP method an invocation handler is exposed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    pub(crate) fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Put => MethodFilter::PUT,
            Self::Patch => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
            Self::Head => MethodFilter::HEAD,
            Self::Options => MethodFilter::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive: `"post"`, `"Post"` and `"POST"` all parse.
impl FromStr for HttpMethod {
    type Err = SidecarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(SidecarError::InvalidArgument(format!(
                "unsupported HTTP method '{s}'"
            ))),
        }
    }
}

/// Options for [`crate::ServerInvoker::listen`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokerListenOptions {
    pub method: HttpMethod,
}

impl InvokerListenOptions {
    #[must_use]
    pub fn method(method: HttpMethod) -> Self {
        Self { method }
    }
}

/// A topic subscription advertised to the sidecar.
///
/// `route` is stored without a leading slash; [`Subscription::path`] is the
/// HTTP path the sidecar delivers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "pubsubname")]
    pub pubsub_name: String,
    pub topic: String,
    #[serde(serialize_with = "serialize_route_path")]
    pub route: String,
}

impl Subscription {
    #[must_use]
    pub fn new(pubsub_name: &str, topic: &str, route: Option<&str>) -> Self {
        let route = match route.map(|r| r.trim_start_matches('/')) {
            Some(r) if !r.is_empty() => r.to_owned(),
            _ => default_route(pubsub_name, topic),
        };
        Self {
            pubsub_name: pubsub_name.to_owned(),
            topic: topic.to_owned(),
            route,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.route)
    }
}

/// Route the sidecar delivers a topic to when none is given.
#[must_use]
pub fn default_route(pubsub_name: &str, topic: &str) -> String {
    format!("route-{pubsub_name}-{topic}")
}

fn serialize_route_path<S: serde::Serializer>(route: &str, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("/{route}"))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn lock_request() -> LockRequest {
        LockRequest {
            store_name: "redis".to_owned(),
            resource_id: "order-1".to_owned(),
            lock_owner: new_lock_owner(),
            expiry_in_seconds: 30,
        }
    }

    #[test]
    fn lock_status_maps_every_known_code() {
        assert_eq!(LockStatus::from_code(0), LockStatus::Success);
        assert_eq!(LockStatus::from_code(1), LockStatus::LockDoesNotExist);
        assert_eq!(LockStatus::from_code(2), LockStatus::LockBelongToOthers);
        assert_eq!(LockStatus::from_code(3), LockStatus::InternalError);
    }

    #[test]
    fn lock_status_unknown_code_is_internal_error() {
        for code in [-1, 4, 99, i32::MAX] {
            assert_eq!(LockStatus::from_code(code), LockStatus::InternalError);
        }
    }

    #[test]
    fn lock_request_validation() {
        assert!(lock_request().validate().is_ok());

        let mut req = lock_request();
        req.store_name.clear();
        assert!(matches!(req.validate(), Err(SidecarError::InvalidArgument(_))));

        let mut req = lock_request();
        req.expiry_in_seconds = u32::MAX;
        assert!(matches!(req.validate(), Err(SidecarError::InvalidArgument(_))));

        let mut req = lock_request();
        req.expiry_in_seconds = 0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn lock_owners_are_unique_per_call() {
        assert_ne!(new_lock_owner(), new_lock_owner());
    }

    #[test]
    fn lock_request_converts_to_wire() {
        let req = lock_request();
        let wire = proto::TryLockRequest::from(&req);
        assert_eq!(wire.store_name, "redis");
        assert_eq!(wire.resource_id, "order-1");
        assert_eq!(wire.lock_owner, req.lock_owner);
        assert_eq!(wire.expiry_in_seconds, 30);
    }

    #[test]
    fn http_method_parses_case_insensitively() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }

    #[test]
    fn subscription_defaults_route() {
        let sub = Subscription::new("redis", "orders", None);
        assert_eq!(sub.route, "route-redis-orders");
        assert_eq!(sub.path(), "/route-redis-orders");

        let sub = Subscription::new("redis", "orders", Some(""));
        assert_eq!(sub.route, "route-redis-orders");
    }

    #[test]
    fn subscription_keeps_explicit_route() {
        let sub = Subscription::new("redis", "orders", Some("/checkout"));
        assert_eq!(sub.route, "checkout");
        assert_eq!(sub.path(), "/checkout");
    }

    #[test]
    fn subscription_serializes_for_the_sidecar() {
        let sub = Subscription::new("redis", "orders", None);
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pubsubname": "redis",
                "topic": "orders",
                "route": "/route-redis-orders"
            })
        );
    }
}
