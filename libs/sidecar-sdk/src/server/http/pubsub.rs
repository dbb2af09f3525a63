use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::FutureExt;
use serde_json::{Value, json};

use super::{RouteHandler, json_response, panic_message};
use crate::api::PubSubCallback;
use crate::models::Subscription;
use crate::server::PubSubAckPolicy;

/// Pull the `data` field out of a delivered event. Missing or empty means `null`.
fn event_data(raw: &[u8]) -> Result<Value, serde_json::Error> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let mut event: Value = serde_json::from_slice(raw)?;
    Ok(event.get_mut("data").map_or(Value::Null, Value::take))
}

pub(super) fn handler(
    subscription: Subscription,
    callback: PubSubCallback,
    ack: PubSubAckPolicy,
) -> RouteHandler {
    let subscription = Arc::new(subscription);
    Arc::new(move |req: Request| {
        let subscription = Arc::clone(&subscription);
        let callback = Arc::clone(&callback);
        async move { deliver(&subscription, &callback, ack, req).await }.boxed()
    })
}

async fn deliver(
    subscription: &Subscription,
    callback: &PubSubCallback,
    ack: PubSubAckPolicy,
    req: Request,
) -> Response {
    let raw = match Bytes::from_request(req, &()).await {
        Ok(raw) => raw,
        Err(rejection) => return rejection.into_response(),
    };

    let data = match event_data(&raw) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(
                pubsub = %subscription.pubsub_name,
                topic = %subscription.topic,
                error = %e,
                "dropping delivery with malformed event body"
            );
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"success": false, "error": e.to_string()}),
            );
        }
    };

    let outcome = AssertUnwindSafe(async { callback(data).await })
        .catch_unwind()
        .await;
    let failure = match outcome {
        Ok(Ok(())) => return json_response(StatusCode::OK, &json!({"success": true})),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    match ack {
        PubSubAckPolicy::Always => {
            tracing::error!(
                pubsub = %subscription.pubsub_name,
                topic = %subscription.topic,
                error = %failure,
                "subscription callback failed, acknowledging anyway"
            );
            json_response(StatusCode::OK, &json!({"success": true}))
        }
        PubSubAckPolicy::RetryOnError => {
            tracing::error!(
                pubsub = %subscription.pubsub_name,
                topic = %subscription.topic,
                error = %failure,
                "subscription callback failed, requesting redelivery"
            );
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &json!({"success": false}))
        }
    }
}
