//! HTTP routes for the PageBot webhook endpoints.
//!
//! - `GET /webhook` - Meta webhook verification (`hub.challenge` echo)
//! - `POST /webhook` - incoming messaging events
//! - `GET /` - liveness/status payload

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::message::InboundMessage;
use crate::messenger::{self, MessengerChannel};
use pagebot_common::logging::Metrics;
use pagebot_memory::ConversationStore;

// ============================================================================
// State
// ============================================================================

/// Shared state for the relay HTTP server.
pub struct RelayState {
    /// Messenger channel instance
    pub messenger: Arc<MessengerChannel>,
    /// App secret for webhook signature verification
    pub app_secret: Option<Arc<str>>,
    /// Queue for forwarding incoming messages to the bridge
    pub message_tx: mpsc::Sender<InboundMessage>,
    /// Processing counters
    pub metrics: Arc<Metrics>,
    /// Conversation store (for the active-user count)
    pub store: Arc<ConversationStore>,
    /// Process start time (for uptime)
    pub started_at: Instant,
}

/// Create the shared state and the message receiver for the bridge.
pub fn create_state(
    messenger: Arc<MessengerChannel>,
    app_secret: Option<String>,
    store: Arc<ConversationStore>,
    metrics: Arc<Metrics>,
) -> (Arc<RelayState>, mpsc::Receiver<InboundMessage>) {
    let (tx, rx) = mpsc::channel(100);
    let state = Arc::new(RelayState {
        messenger,
        app_secret: app_secret.map(Arc::from),
        message_tx: tx,
        metrics,
        store,
        started_at: Instant::now(),
    });
    (state, rx)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
    active_users: usize,
    messages_processed: u64,
    errors: u64,
    replies_sent: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

// ============================================================================
// Status Route
// ============================================================================

async fn status(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let summary = state.metrics.summary().await;
    Json(StatusResponse {
        status: "ok",
        service: "pagebot-relay",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_users: state.store.active_users().await,
        messages_processed: summary.messages_processed,
        errors: summary.errors,
        replies_sent: summary.replies_sent,
    })
}

// ============================================================================
// Webhook Verification
// ============================================================================

/// Verification query params (Meta webhook subscription handshake)
#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook - Meta webhook verification
async fn webhook_verify(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<VerifyQuery>,
) -> impl IntoResponse {
    let token_matches = params.verify_token.as_deref() == Some(state.messenger.verify_token());

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        if let Some(challenge) = params.challenge {
            tracing::info!("Messenger webhook verified successfully");
            return (StatusCode::OK, challenge);
        }
        return (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string());
    }

    tracing::warn!("Messenger webhook verification failed - token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

// ============================================================================
// Webhook Events
// ============================================================================

/// POST /webhook - incoming message webhook
async fn webhook_receive(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Verify X-Hub-Signature-256 if an app secret is configured
    if let Some(ref app_secret) = state.app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !messenger::verify_signature(app_secret, &body, signature) {
            tracing::warn!(
                "Webhook signature verification failed (signature: {})",
                if signature.is_empty() { "missing" } else { "invalid" }
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse {
                    success: false,
                    message: Some("Invalid signature".to_string()),
                }),
            );
        }
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse {
                success: false,
                message: Some("Invalid JSON payload".to_string()),
            }),
        );
    };

    // Only page subscriptions belong to this relay
    if payload.get("object").and_then(|o| o.as_str()) != Some("page") {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse {
                success: false,
                message: Some("Unknown webhook object".to_string()),
            }),
        );
    }

    let messages = state.messenger.parse_webhook_payload(&payload);

    for msg in messages {
        tracing::info!(
            sender = %msg.sender_id,
            trace_id = %msg.trace_id,
            "Messenger event received"
        );

        if let Err(e) = state.message_tx.send(msg).await {
            tracing::error!("Failed to enqueue Messenger message: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse {
                    success: false,
                    message: Some(format!("Failed to enqueue message: {e}")),
                }),
            );
        }
    }

    (
        StatusCode::OK,
        Json(WebhookResponse {
            success: true,
            message: None,
        }),
    )
}

// ============================================================================
// Router
// ============================================================================

/// Build the relay router.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/webhook", get(webhook_verify).post(webhook_receive))
        .with_state(state)
}
