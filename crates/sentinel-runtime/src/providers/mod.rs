//! LLM Provider abstractions for sentinel-runtime.
//!
//! This module defines the trait for LLM providers and the OpenAI-compatible
//! chat-completions backend used for both OpenRouter and local servers.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
mod openai;
pub mod secrets;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use openai::{
    LocalProviderFactory, OpenAiCompatibleProvider, OpenRouterProviderFactory,
    LOCAL_LLM_API_KEY_ENV, OPENROUTER_API_KEY_ENV,
};
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid structured output: {0}")]
    Schema(String),
}

/// How the retry layer treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Never retried; triggers the conservative evaluation upstream.
    RateLimited,
    /// Server hiccup, connection failure or timeout. Retried with backoff.
    Transient,
    Permanent,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::ApiError { status: 429, .. } => ErrorKind::RateLimited,
            // Some gateways only say so in the message body
            ProviderError::ApiError { message, .. }
                if message.to_ascii_lowercase().contains("rate limit") =>
            {
                ErrorKind::RateLimited
            }
            ProviderError::ApiError { status, .. } if (500..600).contains(status) => {
                ErrorKind::Transient
            }
            ProviderError::HttpError(_) | ProviderError::Timeout(_) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,

    /// Ask the backend for a JSON object response
    pub json_mode: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "liquid/lfm-2.2-6b".to_string(),
            max_tokens: 8192,
            temperature: 0.1,
            timeout: Duration::from_secs(120),
            json_mode: false,
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Finish reason reported by the backend
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Stages never hold a provider directly; they go through
/// [`InferenceClient`](crate::client::InferenceClient), which adds retry and
/// schema validation on top.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        let system = ChatMessage::system("You extract job data.");
        assert_eq!(system.role, "system");

        let user = ChatMessage::user("Hello!");
        assert_eq!(user.role, "user");

        let assistant = ChatMessage::assistant("{}");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_error_kinds() {
        let rate = ProviderError::RateLimited { retry_after: None };
        assert_eq!(rate.kind(), ErrorKind::RateLimited);

        let status_429 = ProviderError::ApiError {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(status_429.is_rate_limited());

        let rate_message = ProviderError::ApiError {
            status: 400,
            message: "Rate limit exceeded: free-models-per-day".to_string(),
        };
        assert!(rate_message.is_rate_limited());

        for status in [500, 502, 503, 504] {
            let err = ProviderError::ApiError {
                status,
                message: "upstream".to_string(),
            };
            assert!(err.is_transient(), "{} should be transient", status);
        }

        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::HttpError("connection reset".to_string()).is_transient());

        assert_eq!(ProviderError::AuthError.kind(), ErrorKind::Permanent);
        assert_eq!(
            ProviderError::Schema("missing field".to_string()).kind(),
            ErrorKind::Permanent
        );
        let bad_request = ProviderError::ApiError {
            status: 400,
            message: "bad model".to_string(),
        };
        assert_eq!(bad_request.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }
}
