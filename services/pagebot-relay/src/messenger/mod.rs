//! Messenger channel for the PageBot relay.
//!
//! Uses the Facebook Graph Send API for outbound messages. Inbound messages
//! arrive via webhook (push-based).

pub mod format;

use crate::message::{InboundMessage, MessageContent};
use hmac::{Hmac, Mac};
use pagebot_common::error::{Error, Result};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;

/// Sender actions supported by the Send API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderAction {
    TypingOn,
    TypingOff,
}

impl SenderAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
        }
    }
}

/// Messenger channel using the Graph API.
pub struct MessengerChannel {
    page_access_token: String,
    verify_token: String,
    allowed_senders: Vec<String>,
    api_base: String,
    client: Client,
}

impl MessengerChannel {
    /// Create a new Messenger channel.
    pub fn new(
        page_access_token: String,
        verify_token: String,
        allowed_senders: Vec<String>,
        api_base: String,
    ) -> Self {
        Self {
            page_access_token,
            verify_token,
            allowed_senders,
            api_base,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Check if a sender PSID is allowed to talk to the relay.
    pub fn is_sender_allowed(&self, psid: &str) -> bool {
        self.allowed_senders.iter().any(|s| s == "*" || s == psid)
    }

    /// Get the verify token for webhook verification.
    pub fn verify_token(&self) -> &str {
        &self.verify_token
    }

    /// Parse an incoming webhook payload and extract messages.
    ///
    /// The caller has already checked `object == "page"`. Unauthorized
    /// senders and page echoes are dropped here.
    pub fn parse_webhook_payload(&self, payload: &serde_json::Value) -> Vec<InboundMessage> {
        let mut messages = Vec::new();

        let Some(entries) = payload.get("entry").and_then(|e| e.as_array()) else {
            return messages;
        };

        for entry in entries {
            let Some(events) = entry.get("messaging").and_then(|m| m.as_array()) else {
                continue;
            };

            for event in events {
                let Some(sender_id) = event
                    .pointer("/sender/id")
                    .and_then(|s| s.as_str())
                else {
                    continue;
                };

                if !self.is_sender_allowed(sender_id) {
                    tracing::warn!("Messenger: ignoring message from unauthorized sender: {sender_id}");
                    continue;
                }

                let timestamp = event
                    .get("timestamp")
                    .and_then(|t| t.as_i64())
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

                if let Some(message) = event.get("message") {
                    // The page's own replies echo back through the webhook
                    if message.get("is_echo").and_then(|e| e.as_bool()) == Some(true) {
                        continue;
                    }

                    let id = message
                        .get("mid")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown")
                        .to_string();

                    let content = if let Some(text) =
                        message.get("text").and_then(|t| t.as_str())
                    {
                        if text.trim().is_empty() {
                            continue;
                        }
                        MessageContent::Text {
                            text: text.to_string(),
                        }
                    } else if let Some(attachment) = message
                        .get("attachments")
                        .and_then(|a| a.as_array())
                        .and_then(|a| a.first())
                    {
                        let kind = attachment
                            .get("type")
                            .and_then(|t| t.as_str())
                            .unwrap_or("unknown")
                            .to_string();
                        MessageContent::Attachment { kind }
                    } else {
                        tracing::debug!("Messenger: skipping unsupported message from {sender_id}");
                        continue;
                    };

                    messages.push(InboundMessage {
                        id,
                        sender_id: sender_id.to_string(),
                        content,
                        timestamp,
                        trace_id: pagebot_common::logging::generate_trace_id(),
                    });
                } else if let Some(payload) = event
                    .pointer("/postback/payload")
                    .and_then(|p| p.as_str())
                {
                    messages.push(InboundMessage {
                        id: uuid::Uuid::new_v4().to_string(),
                        sender_id: sender_id.to_string(),
                        content: MessageContent::Postback {
                            payload: payload.to_string(),
                        },
                        timestamp,
                        trace_id: pagebot_common::logging::generate_trace_id(),
                    });
                }
            }
        }

        messages
    }

    /// Send a text message to a recipient.
    pub async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "recipient": { "id": recipient },
            "message": { "text": text }
        });
        self.post_messages(&body).await?;
        tracing::debug!("Messenger message sent to {recipient}");
        Ok(())
    }

    /// Send a typing indicator sender action.
    pub async fn send_sender_action(&self, recipient: &str, action: SenderAction) -> Result<()> {
        let body = serde_json::json!({
            "recipient": { "id": recipient },
            "sender_action": action.as_str()
        });
        self.post_messages(&body).await
    }

    async fn post_messages(&self, body: &serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/me/messages?access_token={}",
            self.api_base, self.page_access_token
        );

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::SendFailed(format!("Messenger send error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(Error::SendFailed(format!(
                "Messenger API error ({status}): {error}"
            )));
        }

        Ok(())
    }
}

/// Verify a Meta webhook body signature (`X-Hub-Signature-256`).
///
/// Returns true if the signature is valid, false otherwise.
pub fn verify_signature(app_secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}
