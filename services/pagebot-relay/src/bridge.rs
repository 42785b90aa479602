//! Relay bridge for PageBot.
//!
//! Handles the complete message flow:
//! 1. Receive an InboundMessage from the webhook
//! 2. Apply rate limiting, chat commands, and the one-time greeting
//! 3. Append to conversation memory and call the model with the history
//! 4. Clean and chunk the reply, send it back through Messenger
//!
//! Same-user events are serialized through a per-user lock; distinct users
//! process concurrently. Failures stay inside the event that caused them.

use crate::commands;
use crate::message::InboundMessage;
use crate::messenger::format::{clean_response, split_message};
use crate::messenger::{MessengerChannel, SenderAction};
use crate::provider::{ChatMessage, ChatRequest, Provider};
use crate::ratelimit::RateLimiter;
use crate::greeting::GreetingTracker;
use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use pagebot_common::config::Config;
use pagebot_common::logging::Metrics;
use pagebot_memory::{ConversationStore, Role};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const RATE_LIMIT_NOTICE: &str =
    "You're sending messages a bit too quickly. Give it a minute and try again.";
const NO_REPLY_FALLBACK: &str = "I don't have an answer for that one. Try rephrasing?";
const PROVIDER_APOLOGY: &str =
    "Sorry, I'm having trouble thinking right now. Please try again in a moment.";
const ATTACHMENT_NOTICE: &str = "I can only read text messages for now. Send me words!";

/// Dispatcher-level settings captured from config at startup.
struct BridgeSettings {
    model: String,
    system_prompt: Option<String>,
    max_tokens: i64,
    temperature: f64,
    greeting: String,
    max_message_len: usize,
}

/// Orchestrates one inbound event end to end.
pub struct RelayBridge {
    messenger: Arc<MessengerChannel>,
    provider: Arc<dyn Provider>,
    store: Arc<ConversationStore>,
    limiter: RateLimiter,
    greetings: GreetingTracker,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    metrics: Arc<Metrics>,
    settings: BridgeSettings,
}

impl RelayBridge {
    /// Create a new bridge.
    pub fn new(
        messenger: Arc<MessengerChannel>,
        provider: Arc<dyn Provider>,
        store: Arc<ConversationStore>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> Self {
        Self {
            messenger,
            provider,
            store,
            limiter: RateLimiter::from_config(&config.relay),
            greetings: GreetingTracker::new(),
            user_locks: DashMap::new(),
            metrics,
            settings: BridgeSettings {
                model: config.llm.model.clone(),
                system_prompt: config.llm.system_prompt.clone(),
                max_tokens: config.llm.max_output_tokens,
                temperature: config.llm.temperature,
                greeting: config.relay.greeting.clone(),
                max_message_len: config.relay.max_message_len,
            },
        }
    }

    /// The conversation store behind this bridge.
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Process one inbound message.
    ///
    /// Events from the same sender are serialized; the per-user lock keeps
    /// interleaved webhook deliveries from racing on that user's history.
    pub async fn process(&self, message: InboundMessage) -> Result<()> {
        let lock = self.user_lock(&message.sender_id);
        let _guard = lock.lock().await;

        let result = self.process_serialized(&message).await;
        self.metrics.record_message(result.is_ok()).await;

        if let Err(ref e) = result {
            tracing::error!(
                sender = %message.sender_id,
                trace_id = %message.trace_id,
                error = %e,
                "Message processing failed"
            );
        }
        result
    }

    async fn process_serialized(&self, message: &InboundMessage) -> Result<()> {
        let sender = &message.sender_id;

        if message.is_attachment() {
            self.messenger.send_text(sender, ATTACHMENT_NOTICE).await?;
            return Ok(());
        }

        let Some(text) = message.text().map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let now = Utc::now();

        if !self.limiter.allow(sender, now) {
            tracing::info!(sender = %sender, "Rate limit hit");
            self.messenger.send_text(sender, RATE_LIMIT_NOTICE).await?;
            return Ok(());
        }

        if let Some(reply) = commands::handle_chat_command(&self.store, sender, text).await {
            self.messenger.send_text(sender, &reply).await?;
            return Ok(());
        }

        // At-most-once introduction per process lifetime
        if self.greetings.mark_greeted(sender) {
            self.messenger
                .send_text(sender, &self.settings.greeting)
                .await?;
        }

        // Typing indicator failures never block the reply
        if let Err(e) = self
            .messenger
            .send_sender_action(sender, SenderAction::TypingOn)
            .await
        {
            tracing::debug!(error = %e, "typing_on failed");
        }

        self.store.append(sender, Role::User, text, now).await;

        let history = self.store.history(sender).await;
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: history
                .iter()
                .map(|turn| ChatMessage {
                    role: turn.role,
                    content: turn.content.clone(),
                })
                .collect(),
            system: self.settings.system_prompt.clone(),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
        };

        let reply = match self.provider.chat(request).await {
            Ok(response) => match response.content {
                Some(content) => {
                    self.store
                        .append(sender, Role::Model, &content, Utc::now())
                        .await;
                    clean_response(&content)
                }
                None => {
                    tracing::info!(sender = %sender, "Model returned no candidate");
                    NO_REPLY_FALLBACK.to_string()
                }
            },
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "Model call failed");
                PROVIDER_APOLOGY.to_string()
            }
        };

        let chunks = split_message(&reply, self.settings.max_message_len);
        for chunk in &chunks {
            self.messenger.send_text(sender, chunk).await?;
        }
        self.metrics.record_replies(chunks.len() as u64).await;

        if let Err(e) = self
            .messenger
            .send_sender_action(sender, SenderAction::TypingOff)
            .await
        {
            tracing::debug!(error = %e, "typing_off failed");
        }

        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a background processor that handles messages from the webhook
    /// queue. Each message runs in its own task so one user's slow model
    /// call never blocks another user.
    pub fn spawn_processor(
        bridge: Arc<Self>,
        mut rx: mpsc::Receiver<InboundMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Relay bridge processor started");

            while let Some(message) = rx.recv().await {
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    if let Err(e) = bridge.process(message).await {
                        tracing::error!(error = %e, "Failed to process message");
                    }
                });
            }

            tracing::info!("Relay bridge processor stopped");
        })
    }
}
