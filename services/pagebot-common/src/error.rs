//! Error types for the PageBot relay.

use thiserror::Error;

/// Result type alias using the PageBot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for PageBot services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Webhook verification failure (bad verify token or signature)
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Payload addressed to something other than this relay
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Language-model provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Messaging platform send error
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Snapshot persistence error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a verification error.
    pub const fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }

    /// Check if this is a rate limit error.
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Verification(_) => 403,
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::RateLimited(_) => 429,
            Self::Provider(_) | Self::SendFailed(_) => 502,
            Self::Timeout => 408,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
