use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Connection settings for the co-located sidecar.
///
/// Durations are written in humantime form (`"10s"`, `"250ms"`).
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SidecarConfig {
    /// Host the sidecar listens on.
    pub host: String,

    /// Sidecar HTTP API port.
    pub http_port: u16,

    /// Sidecar gRPC API port.
    pub grpc_port: u16,

    /// Token sent as `dapr-api-token` on every outbound call, if set.
    pub api_token: Option<ApiToken>,

    /// Timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Connection attempts after the first one before giving up.
    pub max_retries: u32,

    /// Backoff step between connection attempts (multiplied by attempt number).
    #[serde(with = "humantime_serde")]
    pub base_backoff: Duration,

    /// Upper bound for the backoff between connection attempts.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            http_port: 3500,
            grpc_port: 50001,
            api_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl SidecarConfig {
    /// Base URL of the sidecar HTTP API, without a trailing slash.
    #[must_use]
    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    /// URI of the sidecar gRPC API.
    #[must_use]
    pub fn grpc_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.grpc_port)
    }
}

/// Opaque sidecar API token.
///
/// `Debug` prints `[REDACTED]`; the buffer is zeroed on drop.
///
/// Layered config sources may type an all-digit token as a number, so
/// integers are accepted and kept in their decimal form.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access for building request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ApiToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Unsigned(n) => Self(n.to_string()),
            Raw::Signed(n) => Self(n.to_string()),
        })
    }
}

impl Clone for ApiToken {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
