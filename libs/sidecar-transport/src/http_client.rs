//! Pooled HTTP/1.1 client for the sidecar's HTTP API.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use crate::API_TOKEN_HEADER;
use crate::config::SidecarConfig;
use crate::error::TransportError;

/// Connection-pooled client used for every sidecar call.
pub type PooledClient = Client<HttpConnector, Full<Bytes>>;

const BODY_PREVIEW_CHARS: usize = 256;

/// Status and body of a successful (2xx) sidecar response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpReply {
    /// Decode the body as JSON.
    ///
    /// # Errors
    /// Returns [`TransportError::Json`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Shared handle to the sidecar's HTTP API.
///
/// Paths passed to [`HttpTransport::execute`] are appended to the base URL
/// verbatim, so they carry the API version (`/v1.0/healthz`).
pub struct HttpTransport {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    api_token: Option<HeaderValue>,
    client: OnceCell<PooledClient>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            connect_timeout: Duration::from_secs(10),
            request_timeout,
            api_token: None,
            client: OnceCell::new(),
        }
    }

    /// Build a handle for the sidecar described by `cfg`.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidApiToken`] if the configured token is
    /// not a valid header value.
    pub fn from_config(cfg: &SidecarConfig) -> Result<Self, TransportError> {
        let mut transport = Self::new(cfg.http_endpoint(), cfg.request_timeout);
        transport.connect_timeout = cfg.connect_timeout;
        match &cfg.api_token {
            Some(token) => transport.with_api_token(token.expose()),
            None => Ok(transport),
        }
    }

    /// Send `token` as the `dapr-api-token` header on every request.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidApiToken`] if `token` is not a valid header value.
    pub fn with_api_token(mut self, token: &str) -> Result<Self, TransportError> {
        let mut value =
            HeaderValue::from_str(token).map_err(|_| TransportError::InvalidApiToken)?;
        value.set_sensitive(true);
        self.api_token = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the pooled client has been created already.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    /// Obtain the pooled client, creating it on first use.
    pub async fn client(&self) -> &PooledClient {
        self.client
            .get_or_init(|| async {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(self.connect_timeout));
                connector.set_nodelay(true);
                tracing::debug!(base_url = %self.base_url, "sidecar HTTP client created");
                Client::builder(TokioExecutor::new()).build(connector)
            })
            .await
    }

    /// Send a request with an optional raw body.
    ///
    /// `Content-Type: application/json` is always set, matching what the
    /// sidecar expects on its API.
    ///
    /// # Errors
    /// Returns a [`TransportError`] on connection failure, timeout, or a
    /// non-2xx response status.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<HttpReply, TransportError> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.api_token {
            builder = builder.header(API_TOKEN_HEADER, token.clone());
        }
        let request = builder.body(Full::new(body.unwrap_or_default()))?;

        let client = self.client().await;
        let exchange = async {
            let response = client
                .request(request)
                .await
                .map_err(|e| TransportError::Http {
                    path: path.to_owned(),
                    source: Box::new(e),
                })?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::Http {
                    path: path.to_owned(),
                    source: Box::new(e),
                })?
                .to_bytes();
            Ok::<_, TransportError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                path: path.to_owned(),
                timeout: self.request_timeout,
            })??;

        tracing::trace!(%method, path, status = status.as_u16(), "sidecar HTTP call completed");

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                path: path.to_owned(),
                status,
                body_preview: String::from_utf8_lossy(&body)
                    .chars()
                    .take(BODY_PREVIEW_CHARS)
                    .collect(),
            });
        }

        Ok(HttpReply { status, body })
    }

    /// Send `payload` as a JSON body and decode the JSON response.
    ///
    /// # Errors
    /// Same as [`HttpTransport::execute`], plus [`TransportError::Json`] when
    /// encoding the payload or decoding the response fails.
    pub async fn execute_json<B, T>(
        &self,
        method: Method,
        path: &str,
        payload: &B,
    ) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = Bytes::from(serde_json::to_vec(payload)?);
        self.execute(method, path, Some(body)).await?.json()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
