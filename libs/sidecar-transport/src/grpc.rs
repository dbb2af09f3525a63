//! Lazily connected gRPC channel to the sidecar.
//!
//! The channel is built with connect/RPC timeouts and HTTP/2 keepalive, and
//! connection establishment is retried with linear backoff. Individual RPCs
//! are never retried here.

use std::time::Duration;

use tokio::sync::OnceCell;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tracing::Instrument;

use crate::config::SidecarConfig;
use crate::error::TransportError;
use crate::API_TOKEN_HEADER;

fn duration_to_u64_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Transport-level settings for the gRPC channel.
#[derive(Debug, Clone)]
pub struct GrpcClientConfig {
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,

    /// Timeout applied to every RPC on the channel.
    pub rpc_timeout: Duration,

    /// Connection attempts after the first one.
    pub max_retries: u32,

    /// Backoff step between connection attempts.
    pub base_backoff: Duration,

    /// Backoff cap.
    pub max_backoff: Duration,

    /// Name used in tracing spans and connection errors.
    pub service_name: &'static str,
}

impl Default for GrpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            service_name: "sidecar",
        }
    }
}

impl From<&SidecarConfig> for GrpcClientConfig {
    fn from(cfg: &SidecarConfig) -> Self {
        Self {
            connect_timeout: cfg.connect_timeout,
            rpc_timeout: cfg.request_timeout,
            max_retries: cfg.max_retries,
            base_backoff: cfg.base_backoff,
            max_backoff: cfg.max_backoff,
            ..Default::default()
        }
    }
}

impl GrpcClientConfig {
    #[must_use]
    pub fn new(service_name: &'static str) -> Self {
        Self {
            service_name,
            ..Default::default()
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the RPC timeout.
    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Set the number of connection attempts made after the first one fails.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff step and its cap.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .checked_mul(attempt)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

fn build_endpoint(uri: &str, cfg: &GrpcClientConfig) -> Result<Endpoint, TransportError> {
    let endpoint = Endpoint::from_shared(uri.to_owned())
        .map_err(|source| TransportError::InvalidEndpoint {
            uri: uri.to_owned(),
            source,
        })?
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.rpc_timeout)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .http2_keep_alive_interval(Duration::from_secs(30))
        .keep_alive_timeout(Duration::from_secs(10))
        .keep_alive_while_idle(true);

    Ok(endpoint)
}

/// Connect to `uri`, retrying failed attempts with backoff.
///
/// # Errors
/// Returns [`TransportError::InvalidEndpoint`] if `uri` cannot be parsed and
/// [`TransportError::Connect`] once all attempts have failed.
pub async fn connect_with_retry(
    uri: &str,
    cfg: &GrpcClientConfig,
) -> Result<Channel, TransportError> {
    let endpoint = build_endpoint(uri, cfg)?;
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let span = tracing::debug_span!(
            "grpc_connect",
            service = cfg.service_name,
            uri = %uri,
            attempt
        );

        match endpoint.connect().instrument(span).await {
            Ok(channel) => {
                tracing::info!(
                    service = cfg.service_name,
                    uri = %uri,
                    attempt,
                    "gRPC channel to sidecar established"
                );
                return Ok(channel);
            }
            Err(e) if attempt <= cfg.max_retries => {
                let backoff = cfg.backoff_for(attempt);
                tracing::warn!(
                    service = cfg.service_name,
                    attempt,
                    max_retries = cfg.max_retries,
                    error = %e,
                    backoff_ms = duration_to_u64_ms(backoff),
                    "gRPC connection failed, retrying..."
                );
                tokio::time::sleep(backoff).await;
            }
            Err(source) => {
                tracing::error!(
                    service = cfg.service_name,
                    attempt,
                    error = %source,
                    "gRPC connection failed after all retries"
                );
                return Err(TransportError::Connect {
                    uri: uri.to_owned(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Shared handle to the sidecar's gRPC API.
///
/// The channel is created on the first call to [`GrpcTransport::channel`] and
/// reused afterwards. Cloning a `Channel` is cheap, so callers get their own
/// copy per call.
pub struct GrpcTransport {
    uri: String,
    config: GrpcClientConfig,
    api_token: Option<MetadataValue<tonic::metadata::Ascii>>,
    channel: OnceCell<Channel>,
}

impl GrpcTransport {
    #[must_use]
    pub fn new(uri: impl Into<String>, config: GrpcClientConfig) -> Self {
        Self {
            uri: uri.into(),
            config,
            api_token: None,
            channel: OnceCell::new(),
        }
    }

    /// Build a handle for the sidecar described by `cfg`.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidApiToken`] if the configured token is
    /// not a valid metadata value.
    pub fn from_config(cfg: &SidecarConfig) -> Result<Self, TransportError> {
        let transport = Self::new(cfg.grpc_endpoint(), GrpcClientConfig::from(cfg));
        match &cfg.api_token {
            Some(token) => transport.with_api_token(token.expose()),
            None => Ok(transport),
        }
    }

    /// Send `token` as `dapr-api-token` metadata on every request.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidApiToken`] if `token` is not valid ASCII metadata.
    pub fn with_api_token(mut self, token: &str) -> Result<Self, TransportError> {
        let value: MetadataValue<tonic::metadata::Ascii> =
            token.parse().map_err(|_| TransportError::InvalidApiToken)?;
        self.api_token = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether the channel has been established already.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.initialized()
    }

    /// Obtain the live channel, connecting on first use.
    ///
    /// # Errors
    /// Returns the connection error if the channel cannot be established.
    /// The next call will try again.
    pub async fn channel(&self) -> Result<Channel, TransportError> {
        self.channel
            .get_or_try_init(|| connect_with_retry(&self.uri, &self.config))
            .await
            .cloned()
    }

    /// Wrap `message` in a request carrying the configured API token.
    #[must_use]
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = &self.api_token {
            request
                .metadata_mut()
                .insert(API_TOKEN_HEADER, token.clone());
        }
        request
    }
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport")
            .field("uri", &self.uri)
            .field("config", &self.config)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("connected", &self.is_connected())
            .finish()
    }
}
