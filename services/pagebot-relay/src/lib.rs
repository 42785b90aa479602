//! PageBot Relay - Facebook Messenger to Gemini chat relay.
//!
//! The relay receives Messenger webhook events, forwards user text to the
//! Gemini API with bounded per-user conversation history, and relays the
//! cleaned, chunked reply back through the Send API.
//!
//! ```text
//! Messenger → webhook → routes → bridge → Gemini
//!      ↑                            ↓
//!      └────── Send API ←── clean + chunk
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bridge;
pub mod commands;
pub mod greeting;
pub mod message;
pub mod messenger;
pub mod provider;
pub mod ratelimit;
pub mod routes;

// Re-export commonly used types
pub use bridge::RelayBridge;
pub use message::{InboundMessage, MessageContent};
pub use messenger::{MessengerChannel, SenderAction};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, GeminiProvider, Provider};
pub use ratelimit::RateLimiter;
pub use routes::{build_router, create_state, RelayState};

use anyhow::Context;
use pagebot_common::config::Config;
use pagebot_common::logging::Metrics;
use pagebot_memory::{ConversationStore, MemorySettings, SnapshotFile};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Build the relay router, message queue, and bridge from configuration.
pub fn build_relay(
    config: &Config,
) -> anyhow::Result<(
    axum::Router,
    tokio::sync::mpsc::Receiver<InboundMessage>,
    Arc<RelayBridge>,
)> {
    let page_access_token = config
        .messenger
        .page_access_token
        .clone()
        .context("messenger.page_access_token is not configured (set PAGE_ACCESS_TOKEN)")?;
    let verify_token = config
        .messenger
        .verify_token
        .clone()
        .context("messenger.verify_token is not configured (set VERIFY_TOKEN)")?;

    let messenger = Arc::new(MessengerChannel::new(
        page_access_token,
        verify_token,
        config.messenger.allowed_senders.clone(),
        config.messenger.graph_api_base.clone(),
    ));

    let store = Arc::new(ConversationStore::with_snapshot(
        MemorySettings::from_config(&config.memory),
        SnapshotFile::new(config.memory.resolved_snapshot_path()),
    ));

    let provider = Arc::new(
        GeminiProvider::new(
            config.llm.api_key.as_deref(),
            Duration::from_secs(config.llm.timeout_secs),
        ),
    );

    let metrics = Arc::new(Metrics::new());

    let bridge = Arc::new(RelayBridge::new(
        messenger.clone(),
        provider,
        store.clone(),
        metrics.clone(),
        config,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let (state, rx) = create_state(
        messenger,
        config.messenger.app_secret.clone(),
        store,
        metrics,
    );
    let router = build_router(state).layer(cors);

    Ok((router, rx, bridge))
}

/// Start the relay HTTP server with the bridge processor and the periodic
/// memory sweep.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let (router, rx, bridge) = build_relay(config)?;
    let store = bridge.store().clone();

    // Spawn the message processor
    let processor_handle = RelayBridge::spawn_processor(bridge, rx);

    // Spawn the periodic sweep of expired conversation turns
    let sweep_store = store.clone();
    let sweep_every = Duration::from_secs(config.memory.cleanup_interval_secs.max(1));
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        interval.tick().await; // first tick fires immediately

        loop {
            interval.tick().await;
            let removed = sweep_store.sweep(chrono::Utc::now()).await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired conversation turns");
            }
        }
    });

    tracing::info!("Starting PageBot relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Clean up and flush memory before exit
    sweep_handle.abort();
    processor_handle.abort();
    store.flush().await;
    tracing::info!("Conversation snapshot flushed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
