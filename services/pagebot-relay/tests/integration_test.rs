//! Integration tests for the PageBot relay.
//!
//! Tests the webhook endpoints and message forwarding.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use hmac::{Hmac, Mac};
use pagebot_common::logging::Metrics;
use pagebot_memory::{ConversationStore, MemorySettings};
use pagebot_relay::{build_router, create_state, InboundMessage, MessengerChannel};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tower::ServiceExt;

/// Test helper to create a test router.
fn create_test_app() -> (axum::Router, tokio::sync::mpsc::Receiver<InboundMessage>) {
    create_app_with(None, vec!["*".into()])
}

fn create_app_with(
    app_secret: Option<String>,
    allowed_senders: Vec<String>,
) -> (axum::Router, tokio::sync::mpsc::Receiver<InboundMessage>) {
    let messenger = Arc::new(MessengerChannel::new(
        "page-token".into(),
        "verify-me".into(),
        allowed_senders,
        "https://graph.facebook.com/v21.0".into(),
    ));
    let store = Arc::new(ConversationStore::new(MemorySettings::default()));
    let metrics = Arc::new(Metrics::new());
    let (state, rx) = create_state(messenger, app_secret, store, metrics);
    (build_router(state), rx)
}

/// Helper to make a JSON request.
async fn request_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = if let Some(b) = body {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap()
    } else {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    (status, json)
}

/// Helper to make a request and read the raw body as text.
async fn request_text(app: &axum::Router, method: Method, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();

    (status, String::from_utf8_lossy(&body).into_owned())
}

fn page_payload(sender: &str, text: &str) -> Value {
    json!({
        "object": "page",
        "entry": [{
            "id": "page-1",
            "messaging": [{
                "sender": { "id": sender },
                "recipient": { "id": "page-1" },
                "timestamp": 1699999999000i64,
                "message": { "mid": "mid.test", "text": text }
            }]
        }]
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_endpoint() {
    let (app, _rx) = create_test_app();

    let (status, json) = request_json(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "pagebot-relay");
    assert_eq!(json["active_users"], 0);
    assert_eq!(json["messages_processed"], 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook Verification Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_webhook_verify_success() {
    let (app, _rx) = create_test_app();

    let (status, body) = request_text(
        &app,
        Method::GET,
        "/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=challenge-42",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "challenge-42");
}

#[tokio::test]
async fn test_webhook_verify_wrong_token() {
    let (app, _rx) = create_test_app();

    let (status, _) = request_text(
        &app,
        Method::GET,
        "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=x",
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_verify_wrong_mode() {
    let (app, _rx) = create_test_app();

    let (status, _) = request_text(
        &app,
        Method::GET,
        "/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=x",
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_verify_missing_challenge() {
    let (app, _rx) = create_test_app();

    let (status, _) = request_text(
        &app,
        Method::GET,
        "/webhook?hub.mode=subscribe&hub.verify_token=verify-me",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook Event Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_webhook_forwards_text_message() {
    let (app, mut rx) = create_test_app();

    let (status, json) = request_json(
        &app,
        Method::POST,
        "/webhook",
        Some(page_payload("user-1", "Hello, PageBot!")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.sender_id, "user-1");
    assert_eq!(msg.text(), Some("Hello, PageBot!"));
}

#[tokio::test]
async fn test_webhook_rejects_foreign_object() {
    let (app, mut rx) = create_test_app();

    let (status, json) = request_json(
        &app,
        Method::POST,
        "/webhook",
        Some(json!({ "object": "instagram", "entry": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_webhook_rejects_invalid_json() {
    let (app, _rx) = create_test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not valid json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_acknowledges_empty_batches() {
    let (app, mut rx) = create_test_app();

    // Delivery receipts and read events have no message to forward
    let (status, json) = request_json(
        &app,
        Method::POST,
        "/webhook",
        Some(json!({
            "object": "page",
            "entry": [{
                "messaging": [{
                    "sender": { "id": "user-1" },
                    "delivery": { "watermark": 1699999999000i64 }
                }]
            }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_webhook_filters_unauthorized_senders() {
    let (app, mut rx) = create_app_with(None, vec!["allowed-user".into()]);

    let (status, _) = request_json(
        &app,
        Method::POST,
        "/webhook",
        Some(page_payload("intruder", "let me in")),
    )
    .await;

    // Acknowledged but not forwarded
    assert_eq!(status, StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_webhook_forwards_attachment_as_attachment() {
    let (app, mut rx) = create_test_app();

    let payload = json!({
        "object": "page",
        "entry": [{
            "messaging": [{
                "sender": { "id": "user-2" },
                "timestamp": 1699999999000i64,
                "message": {
                    "mid": "mid.img",
                    "attachments": [{ "type": "image", "payload": { "url": "https://x/y.jpg" } }]
                }
            }]
        }]
    });

    let (status, _) = request_json(&app, Method::POST, "/webhook", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let msg = rx.try_recv().unwrap();
    assert!(msg.is_attachment());
}

#[tokio::test]
async fn test_webhook_forwards_postback_payload() {
    let (app, mut rx) = create_test_app();

    let payload = json!({
        "object": "page",
        "entry": [{
            "messaging": [{
                "sender": { "id": "user-3" },
                "timestamp": 1699999999000i64,
                "postback": { "title": "Help", "payload": "help" }
            }]
        }]
    });

    let (status, _) = request_json(&app, Method::POST, "/webhook", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.text(), Some("help"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature Verification Tests
// ─────────────────────────────────────────────────────────────────────────────

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[tokio::test]
async fn test_webhook_signature_accepted() {
    let (app, mut rx) = create_app_with(Some("app-secret".into()), vec!["*".into()]);

    let body = serde_json::to_string(&page_payload("user-1", "signed hello")).unwrap();
    let signature = sign("app-secret", body.as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Hub-Signature-256", signature)
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_webhook_signature_rejected() {
    let (app, mut rx) = create_app_with(Some("app-secret".into()), vec!["*".into()]);

    let body = serde_json::to_string(&page_payload("user-1", "forged hello")).unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Hub-Signature-256", "sha256=deadbeef")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_webhook_signature_required_when_configured() {
    let (app, mut rx) = create_app_with(Some("app-secret".into()), vec!["*".into()]);

    // No signature header at all
    let (status, _) = request_json(
        &app,
        Method::POST,
        "/webhook",
        Some(page_payload("user-1", "unsigned hello")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(rx.try_recv().is_err());
}
