//! AI message generation.
//!
//! Automatic announcements are produced by a [`MessageGenerator`]; the
//! production implementation is [`GeminiClient`].

mod gemini;
mod rate_limiter;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{GeminiClient, SYSTEM_PROMPT};
pub use rate_limiter::RateLimiter;

/// Errors that can occur while generating a message.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by the AI service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("AI service returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response from AI service: {0}")]
    InvalidResponse(String),

    #[error("AI service returned no text")]
    EmptyResponse,

    #[error("Failed to reach AI service after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<AiError> },
}

impl AiError {
    /// Whether the request may succeed if tried again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::RateLimited { .. }
        )
    }
}

/// Produces announcement text from a prompt.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}
