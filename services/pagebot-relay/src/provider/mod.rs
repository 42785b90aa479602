//! Language-model provider abstraction.
//!
//! A single trait seam over the generative API so the bridge can be tested
//! without network access. Role names used by a concrete provider are
//! produced only inside that provider; everything above it speaks the
//! two-variant `Role`.

mod gemini;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use pagebot_memory::Role;

/// Unified interface for language-model providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}] {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
    pub status_code: Option<u16>,
}

/// Unified chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Conversation so far, oldest first
    pub messages: Vec<ChatMessage>,
    /// System instruction (if any)
    pub system: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: Option<i64>,
    /// Sampling temperature
    pub temperature: Option<f64>,
}

/// A message in the conversation.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Unified chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Model used
    pub model: String,
    /// Reply text; None when the model returned no candidate, which is a
    /// "no reply" outcome rather than an error
    pub content: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}
