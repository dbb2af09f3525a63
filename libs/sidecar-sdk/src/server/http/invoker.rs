use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Value, json};

use super::{RouteHandler, json_response, panic_message};
use crate::api::InvokerCallback;

/// Request metadata passed to an invocation callback.
#[derive(Debug, Clone, Default)]
pub struct InvokeMetadata {
    pub content_type: Option<String>,
    pub headers: HeaderMap,
}

/// One inbound invocation as seen by the callback.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Request body re-encoded as a JSON document.
    pub body: String,
    /// Original path and query string.
    pub query: String,
    pub metadata: InvokeMetadata,
    /// Lets the callback finalize the response itself.
    pub writer: ResponseWriter,
}

impl InvokeRequest {
    /// Decode [`InvokeRequest::body`] into `T`.
    ///
    /// # Errors
    /// Returns the decode error if the body does not match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Clone)]
struct WrittenResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

/// Write-once response handle.
///
/// The first call to [`ResponseWriter::end`] wins; later calls are ignored.
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    written: Arc<OnceLock<WrittenResponse>>,
}

impl ResponseWriter {
    /// Finalize the response. Returns `false` if it was already finalized.
    pub fn end(&self, status: StatusCode, body: impl Into<Bytes>) -> bool {
        self.write(WrittenResponse {
            status,
            content_type: None,
            body: body.into(),
        })
    }

    /// Finalize the response with a JSON body.
    ///
    /// # Errors
    /// Returns the encode error if `value` cannot be serialized.
    pub fn end_json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> Result<bool, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.write(WrittenResponse {
            status,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from(body),
        }))
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.written.get().is_some()
    }

    fn write(&self, response: WrittenResponse) -> bool {
        let first = self.written.set(response).is_ok();
        if !first {
            tracing::debug!("response already ended, ignoring second write");
        }
        first
    }

    fn response(&self) -> Option<Response> {
        let written = self.written.get()?.clone();
        let mut response = (written.status, written.body).into_response();
        match written.content_type {
            Some(ct) => {
                response.headers_mut().insert(CONTENT_TYPE, ct);
            }
            None => {
                response.headers_mut().remove(CONTENT_TYPE);
            }
        }
        Some(response)
    }
}

/// Re-encode an inbound body as a JSON document.
///
/// Empty bodies become `{}`; anything that is not JSON becomes a JSON string.
fn normalize_body(raw: &[u8]) -> String {
    if raw.is_empty() {
        return "{}".to_owned();
    }
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) => value.to_string(),
        Err(_) => Value::String(String::from_utf8_lossy(raw).into_owned()).to_string(),
    }
}

pub(super) fn handler(method_name: Arc<str>, callback: InvokerCallback) -> RouteHandler {
    Arc::new(move |req: Request| {
        let method_name = Arc::clone(&method_name);
        let callback = Arc::clone(&callback);
        async move { dispatch(&method_name, &callback, req).await }.boxed()
    })
}

async fn dispatch(method_name: &str, callback: &InvokerCallback, req: Request) -> Response {
    let query = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned());
    let headers = req.headers().clone();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let raw = match Bytes::from_request(req, &()).await {
        Ok(raw) => raw,
        Err(rejection) => return rejection.into_response(),
    };

    let writer = ResponseWriter::default();
    let request = InvokeRequest {
        body: normalize_body(&raw),
        query,
        metadata: InvokeMetadata {
            content_type,
            headers,
        },
        writer: writer.clone(),
    };

    let outcome = AssertUnwindSafe(async { callback(request).await })
        .catch_unwind()
        .await;

    if let Some(response) = writer.response() {
        return response;
    }

    match outcome {
        Ok(Ok(Some(value))) => json_response(StatusCode::OK, &value),
        Ok(Ok(None)) => json_response(StatusCode::OK, &json!({"closed": true})),
        Ok(Err(e)) => {
            tracing::error!(method = method_name, error = %e, "invocation callback failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": e.to_string()}),
            )
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(method = method_name, panic = %message, "invocation callback panicked");
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &json!({"error": message}))
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_reencoded() {
        assert_eq!(normalize_body(br#"{ "x" : 1 }"#), r#"{"x":1}"#);
        assert_eq!(normalize_body(b"[1, 2]"), "[1,2]");
    }

    #[test]
    fn empty_body_becomes_empty_object() {
        assert_eq!(normalize_body(b""), "{}");
    }

    #[test]
    fn plain_text_becomes_json_string() {
        assert_eq!(normalize_body(b"hello"), r#""hello""#);
        assert_eq!(normalize_body(b"say \"hi\""), r#""say \"hi\"""#);
    }

    #[test]
    fn writer_accepts_only_first_end() {
        let writer = ResponseWriter::default();
        assert!(!writer.is_ended());
        assert!(writer.end(StatusCode::ACCEPTED, "first"));
        assert!(!writer.end(StatusCode::OK, "second"));
        assert!(writer.is_ended());

        let response = writer.response().unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn writer_clones_share_state() {
        let writer = ResponseWriter::default();
        let clone = writer.clone();
        assert!(clone.end_json(StatusCode::CREATED, &json!({"id": 7})).unwrap());
        assert!(writer.is_ended());
        let response = writer.response().unwrap();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn request_json_decodes_body() {
        let request = InvokeRequest {
            body: r#"{"x":1}"#.to_owned(),
            query: "/foo".to_owned(),
            metadata: InvokeMetadata::default(),
            writer: ResponseWriter::default(),
        };
        let value: Value = request.json().unwrap();
        assert_eq!(value, json!({"x": 1}));
    }
}
