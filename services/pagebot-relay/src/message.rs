//! Inbound message types parsed from Messenger webhook events.

use serde::{Deserialize, Serialize};

/// Unified inbound message from the Messenger webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id (mid), or a generated id for postbacks.
    pub id: String,
    /// Sender PSID.
    pub sender_id: String,
    /// Message content.
    pub content: MessageContent,
    /// Timestamp (Unix millis, platform-provided when available).
    pub timestamp: i64,
    /// Trace id for log correlation.
    pub trace_id: String,
}

/// Inbound content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message
    Text { text: String },
    /// Postback button payload, handled like typed text
    Postback { payload: String },
    /// Attachment of any kind; the relay is text-only and answers with a
    /// notice instead of forwarding these
    Attachment { kind: String },
}

impl InboundMessage {
    /// Get the text content if this is a text message or postback.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Postback { payload } => Some(payload),
            MessageContent::Attachment { .. } => None,
        }
    }

    /// Check if this is an attachment message.
    pub const fn is_attachment(&self) -> bool {
        matches!(self.content, MessageContent::Attachment { .. })
    }
}
