//! Google Gemini provider for the PageBot relay.
//!
//! Calls the `generateContent` endpoint with the conversation history. A
//! response without candidates is reported as `content: None` rather than
//! an error; the bridge turns that into the fallback reply.

use super::{ChatRequest, ChatResponse, Provider, ProviderError};
use async_trait::async_trait;
use pagebot_memory::Role;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider using API-key authentication.
pub struct GeminiProvider {
    api_key: Option<String>,
    api_base: String,
    client: Client,
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// Key resolution: explicit key, then `GEMINI_API_KEY`, then
    /// `GOOGLE_API_KEY`.
    pub fn new(api_key: Option<&str>, timeout: Duration) -> Self {
        let resolved_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok());

        Self {
            api_key: resolved_key,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Override the API base URL (for tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn error(&self, message: impl Into<String>, status_code: Option<u16>) -> ProviderError {
        ProviderError {
            provider: "gemini".into(),
            message: message.into(),
            status_code,
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            self.error(
                "Gemini API key not found. Set GEMINI_API_KEY or GOOGLE_API_KEY.",
                None,
            )
        })?;

        let system_instruction = request.system.as_ref().map(|sys| Content {
            role: None,
            parts: vec![Part { text: sys.clone() }],
        });

        // Convert to the Gemini wire format; this is the only place the
        // provider's role names appear
        let contents: Vec<Content> = request
            .messages
            .iter()
            .map(|msg| Content {
                role: Some(
                    match msg.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        let gemini_request = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(0.7),
                max_output_tokens: request.max_tokens.unwrap_or(2048),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, request.model, api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("API error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse response: {e}"), None))?;

        if let Some(err) = result.error {
            return Err(self.error(format!("API error: {}", err.message), None));
        }

        // No candidate means "no reply", not a failure
        let content = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.is_empty());

        Ok(ChatResponse {
            model: request.model,
            content,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
