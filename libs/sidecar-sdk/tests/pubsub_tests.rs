#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Topic subscriptions and delivery acknowledgement

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use sidecar_sdk::{
    AppServerConfig, PubSubAckPolicy, PubSubCallback, ServerPubSub, SidecarServer,
    pubsub_callback,
};
use tower::ServiceExt;

async fn send(router: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn recording_callback() -> (PubSubCallback, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let callback = pubsub_callback(move |data| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(data);
            Ok(())
        }
    });
    (callback, received)
}

fn failing_callback() -> PubSubCallback {
    pubsub_callback(|_data| async { Err(anyhow::anyhow!("database unavailable")) })
}

fn panicking_callback() -> PubSubCallback {
    pubsub_callback(|data| async move {
        if data.is_object() {
            panic!("order handler crashed");
        }
        anyhow::Ok(())
    })
}

#[tokio::test]
async fn delivery_reaches_callback_on_default_route() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (callback, received) = recording_callback();

    let subscription = server
        .pubsub()
        .subscribe("redis", "orders", callback, None)
        .await
        .unwrap();
    assert_eq!(subscription.path(), "/route-redis-orders");

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"id":"evt-1","topic":"orders","data":{"id":1}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    assert_eq!(*received.lock(), vec![json!({"id": 1})]);
}

#[tokio::test]
async fn missing_data_is_delivered_as_null() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (callback, received) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", callback, Some("/checkout"))
        .await
        .unwrap();

    let (status, _) = send(server.http().router(), "POST", "/checkout", r#"{"topic":"orders"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*received.lock(), vec![Value::Null]);
}

#[tokio::test]
async fn malformed_event_is_rejected_without_calling_back() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (callback, received) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", callback, None)
        .await
        .unwrap();

    let (status, body) = send(server.http().router(), "POST", "/route-redis-orders", "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(received.lock().is_empty());
}

#[tokio::test]
async fn failure_is_acknowledged_by_default() {
    let server = SidecarServer::new(AppServerConfig::default());
    server
        .pubsub()
        .subscribe("redis", "orders", failing_callback(), None)
        .await
        .unwrap();

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"data":{}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn failure_requests_redelivery_when_configured() {
    let server = SidecarServer::new(AppServerConfig {
        pubsub_ack: PubSubAckPolicy::RetryOnError,
        ..Default::default()
    });
    server
        .pubsub()
        .subscribe("redis", "orders", failing_callback(), None)
        .await
        .unwrap();

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"data":{}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false}));
}

#[tokio::test]
async fn panicking_callback_is_acknowledged_by_default() {
    let server = SidecarServer::new(AppServerConfig::default());
    server
        .pubsub()
        .subscribe("redis", "orders", panicking_callback(), None)
        .await
        .unwrap();

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"data":{"id":1}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn panicking_callback_requests_redelivery_when_configured() {
    let server = SidecarServer::new(AppServerConfig {
        pubsub_ack: PubSubAckPolicy::RetryOnError,
        ..Default::default()
    });
    server
        .pubsub()
        .subscribe("redis", "orders", panicking_callback(), None)
        .await
        .unwrap();

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"data":{"id":1}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false}));

    // The server keeps serving after a callback panicked.
    let (status, _) = send(server.http().router(), "GET", "/dapr/subscribe", "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn resubscribing_on_new_route_retires_old_route() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (first, first_received) = recording_callback();
    let (second, second_received) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", first, None)
        .await
        .unwrap();
    server
        .pubsub()
        .subscribe("redis", "orders", second, Some("checkout"))
        .await
        .unwrap();

    let (status, _) = send(
        server.http().router(),
        "POST",
        "/route-redis-orders",
        r#"{"data":{"id":1}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        server.http().router(),
        "POST",
        "/checkout",
        r#"{"data":{"id":2}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    assert!(first_received.lock().is_empty());
    assert_eq!(*second_received.lock(), vec![json!({"id": 2})]);
}

#[tokio::test]
async fn shared_route_survives_when_one_topic_moves() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (orders, _) = recording_callback();
    let (refunds, refunds_received) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", orders, Some("events"))
        .await
        .unwrap();
    server
        .pubsub()
        .subscribe("redis", "refunds", refunds, Some("events"))
        .await
        .unwrap();
    let (orders, _) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", orders, Some("orders-v2"))
        .await
        .unwrap();

    let (status, _) = send(
        server.http().router(),
        "POST",
        "/events",
        r#"{"data":{"refund":1}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*refunds_received.lock(), vec![json!({"refund": 1})]);
}

#[tokio::test]
async fn subscribe_endpoint_lists_subscriptions() {
    let server = SidecarServer::new(AppServerConfig::default());

    let (status, body) = send(server.http().router(), "GET", "/dapr/subscribe", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (callback, _) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", callback, None)
        .await
        .unwrap();
    let (callback, _) = recording_callback();
    server
        .pubsub()
        .subscribe("kafka", "payments", callback, Some("pay"))
        .await
        .unwrap();

    let (status, body) = send(server.http().router(), "GET", "/dapr/subscribe", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"pubsubname": "kafka", "topic": "payments", "route": "/pay"},
            {"pubsubname": "redis", "topic": "orders", "route": "/route-redis-orders"},
        ])
    );
    assert_eq!(server.subscriptions().len(), 2);
}

#[tokio::test]
async fn subscription_routes_only_accept_post() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (callback, _) = recording_callback();
    server
        .pubsub()
        .subscribe("redis", "orders", callback, None)
        .await
        .unwrap();

    let (status, _) = send(server.http().router(), "GET", "/route-redis-orders", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn empty_names_are_rejected() {
    let server = SidecarServer::new(AppServerConfig::default());
    let (callback, _) = recording_callback();
    assert!(
        server
            .pubsub()
            .subscribe("", "orders", Arc::clone(&callback), None)
            .await
            .is_err()
    );
    assert!(
        server
            .pubsub()
            .subscribe("redis", "", callback, None)
            .await
            .is_err()
    );
}
