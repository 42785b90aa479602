//! Configuration management for the PageBot relay.
//!
//! Configuration lives in a single JSON file at `~/.pagebot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PAGE_ACCESS_TOKEN` → messenger.page_access_token
//! - `VERIFY_TOKEN` → messenger.verify_token
//! - `MESSENGER_APP_SECRET` → messenger.app_secret
//! - `GEMINI_API_KEY` / `GOOGLE_API_KEY` → llm.api_key
//! - `GEMINI_MODEL` → llm.model
//! - `PORT` → network.port
//! - `PAGEBOT_BIND_ADDRESS` → network.bind
//! - `PAGEBOT_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pagebot"),
        |dirs| dirs.home_dir().join(".pagebot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Bind address and port for the webhook server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only).
    /// Set to "0.0.0.0" when the webhook is exposed directly.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Port for the webhook server.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

// ============================================================================
// Messenger Configuration
// ============================================================================

/// Facebook Messenger platform credentials and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Page access token for the Send API.
    #[serde(default)]
    pub page_access_token: Option<String>,

    /// Webhook verify token (the `hub.verify_token` shared secret).
    #[serde(default)]
    pub verify_token: Option<String>,

    /// App secret for `X-Hub-Signature-256` body verification.
    /// When unset, signature verification is skipped.
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Sender PSIDs allowed to talk to the relay. `"*"` allows everyone.
    #[serde(default = "default_allowed_senders")]
    pub allowed_senders: Vec<String>,

    /// Graph API base URL. Overridable for tests.
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            page_access_token: None,
            verify_token: None,
            app_secret: None,
            allowed_senders: default_allowed_senders(),
            graph_api_base: default_graph_api_base(),
        }
    }
}

fn default_allowed_senders() -> Vec<String> {
    vec!["*".into()]
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v21.0".into()
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Language-model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Gemini API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Optional system instruction prepended to every conversation.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Maximum tokens the model may generate per reply.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Request timeout in seconds for the generateContent call.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            system_prompt: None,
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_max_output_tokens() -> i64 {
    2048
}

fn default_temperature() -> f64 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Conversation memory retention and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Seconds a turn stays in memory before expiry.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Maximum turns retained per user (FIFO eviction beyond this).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Interval between background sweeps of expired turns, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Snapshot file path. Defaults to `~/.pagebot/conversations.json`.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_turns: default_max_turns(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            snapshot_path: None,
        }
    }
}

impl MemoryConfig {
    /// Resolve the snapshot path, falling back to the config directory.
    pub fn resolved_snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| config_dir().join("conversations.json"))
    }
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_max_turns() -> usize {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

// ============================================================================
// Relay Configuration
// ============================================================================

/// Dispatcher-level policy: greeting, chunking, rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// One-time introduction sent to a user the first time they write
    /// within a process lifetime.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Maximum outbound message length before chunking.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Rate-limit window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Maximum messages allowed per user per window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            max_message_len: default_max_message_len(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max: default_rate_limit_max(),
        }
    }
}

fn default_greeting() -> String {
    "Hi! I'm PageBot. Ask me anything and I'll do my best to help. \
     Send \"help\" to see what else I can do."
        .into()
}

fn default_max_message_len() -> usize {
    2000
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_rate_limit_max() -> u32 {
    30
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the PageBot relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub messenger: MessengerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, using defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("PAGE_ACCESS_TOKEN") {
            self.messenger.page_access_token = Some(token);
        }
        if let Ok(token) = std::env::var("VERIFY_TOKEN") {
            self.messenger.verify_token = Some(token);
        }
        if let Ok(secret) = std::env::var("MESSENGER_APP_SECRET") {
            self.messenger.app_secret = Some(secret);
        }

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        } else if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            self.llm.model = model;
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }
        if let Ok(bind) = std::env::var("PAGEBOT_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("PAGEBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }
}
