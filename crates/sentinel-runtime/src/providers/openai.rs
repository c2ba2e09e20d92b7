//! OpenAI-compatible chat-completions provider.
//!
//! One implementation serves both OpenRouter and local inference servers
//! (Ollama, llama.cpp, vLLM...), which all speak the `/chat/completions`
//! wire format. HTTP support requires the `openai` feature.
//!
//! ## Status mapping
//!
//! | Response | Error |
//! |----------|-------|
//! | 429 | `RateLimited` (with `retry-after` when given) |
//! | 401 / 403 | `AuthError` |
//! | other non-2xx | `ApiError { status, message }` |
//! | 200 with `error` body | `ApiError` with the embedded code |

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[cfg(feature = "openai")]
use super::TokenUsage;
#[cfg(feature = "openai")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "openai")]
use std::time::Duration;

/// Environment variable for the OpenRouter API key.
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Environment variable for the local server API key.
pub const LOCAL_LLM_API_KEY_ENV: &str = "LOCAL_LLM_API_KEY";

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";

/// Most local servers accept any non-empty key.
const LOCAL_PLACEHOLDER_KEY: &str = "local";

/// Provider for any `/chat/completions` endpoint.
pub struct OpenAiCompatibleProvider {
    name: &'static str,
    credential: ApiCredential,
    base_url: String,
    #[cfg(feature = "openai")]
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    /// Create a provider from an already loaded credential.
    pub fn new(name: &'static str, credential: ApiCredential, base_url: impl Into<String>) -> Self {
        Self {
            name,
            credential,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            #[cfg(feature = "openai")]
            client: reqwest::Client::new(),
        }
    }

    /// OpenRouter with a programmatic key.
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(
            "openrouter",
            ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenRouter API key"),
            OPENROUTER_BASE_URL,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn base_url_from(config: &JsonValue, default: &str) -> String {
    config["base_url"].as_str().unwrap_or(default).to_string()
}

fn validate_base_url(config: &JsonValue) -> Result<(), ProviderError> {
    if let Some(url) = config["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(feature = "openai")]
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[cfg(feature = "openai")]
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[cfg(feature = "openai")]
#[derive(Debug, Deserialize)]
struct ErrorDetail {
    /// Numeric on OpenRouter, a string on some local servers.
    #[serde(default)]
    code: Option<JsonValue>,
    message: String,
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    #[cfg(feature = "openai")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            response_format: config.json_mode.then_some(ResponseFormat {
                type_: "json_object",
            }),
        };

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::HttpError(e.to_string()))?;
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ProviderError::ApiError {
                status: error
                    .code
                    .as_ref()
                    .and_then(JsonValue::as_u64)
                    .and_then(|c| u16::try_from(c).ok())
                    .unwrap_or(502),
                message: error.message,
            });
        }

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("Response contained no choices".to_string()))?;

        let usage = body.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model.unwrap_or_else(|| config.model.clone()),
            stop_reason: choice.finish_reason,
        })
    }

    #[cfg(not(feature = "openai"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "{} provider requires the 'openai' feature (endpoint {})",
            self.name,
            self.endpoint()
        )))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Factory for OpenRouter.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "sk-or-...",        // Optional, falls back to OPENROUTER_API_KEY env
///   "base_url": "https://..."      // Optional, custom endpoint
/// }
/// ```
pub struct OpenRouterProviderFactory;

impl ProviderFactory for OpenRouterProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openrouter"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            OPENROUTER_API_KEY_ENV,
            "OpenRouter API key",
        )?;
        Ok(Arc::new(OpenAiCompatibleProvider::new(
            "openrouter",
            credential,
            base_url_from(config, OPENROUTER_BASE_URL),
        )))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENROUTER_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenRouter API key required: set 'api_key' in config or {} env",
                OPENROUTER_API_KEY_ENV
            )));
        }
        validate_base_url(config)
    }

    fn description(&self) -> &'static str {
        "OpenRouter hosted models"
    }
}

/// Factory for a local OpenAI-compatible server.
///
/// The key is optional: `api_key`, then `LOCAL_LLM_API_KEY`, then `"local"`.
pub struct LocalProviderFactory;

impl ProviderFactory for LocalProviderFactory {
    fn provider_type(&self) -> &'static str {
        "local"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let credential = ApiCredential::from_config_env_or(
            config,
            "api_key",
            LOCAL_LLM_API_KEY_ENV,
            LOCAL_PLACEHOLDER_KEY,
            "Local LLM API key",
        );
        Ok(Arc::new(OpenAiCompatibleProvider::new(
            "local",
            credential,
            base_url_from(config, LOCAL_BASE_URL),
        )))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        validate_base_url(config)
    }

    fn description(&self) -> &'static str {
        "Local OpenAI-compatible inference server"
    }
}
