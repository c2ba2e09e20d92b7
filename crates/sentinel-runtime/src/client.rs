//! Inference client: one provider plus request defaults and retry policy.
//!
//! Stages only ever see this type. Two entry points:
//! - [`InferenceClient::complete_structured`] asks for JSON mode and
//!   validates the reply against the target type's schema
//! - [`InferenceClient::complete_text`] returns the raw content

use std::sync::Arc;

use sentinel_core::schema::{self, StructuredOutput};

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::RetryPolicy;

/// Provider handle shared by stages. Cheap to clone.
#[derive(Clone)]
pub struct InferenceClient {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    retry: RetryPolicy,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .field("retry", &self.retry)
            .finish()
    }
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            config: CompletionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Plain text completion.
    ///
    /// `temperature` overrides the configured default for this call only.
    pub async fn complete_text(
        &self,
        messages: &[ChatMessage],
        context: &str,
        temperature: Option<f32>,
    ) -> Result<String, ProviderError> {
        self.complete(messages, context, temperature, false).await
    }

    /// JSON-mode completion, strictly parsed and validated against `T`'s
    /// schema. Invalid output surfaces as [`ProviderError::Schema`].
    pub async fn complete_structured<T: StructuredOutput>(
        &self,
        messages: &[ChatMessage],
        context: &str,
        temperature: Option<f32>,
    ) -> Result<T, ProviderError> {
        let content = self.complete(messages, context, temperature, true).await?;
        schema::from_str::<T>(&content).map_err(|e| ProviderError::Schema(e.to_string()))
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        context: &str,
        temperature: Option<f32>,
        json_mode: bool,
    ) -> Result<String, ProviderError> {
        let mut config = self.config.clone();
        if let Some(t) = temperature {
            config.temperature = t;
        }
        config.json_mode = json_mode;

        let response = self
            .retry
            .run(context, || self.provider.complete(messages.to_vec(), &config))
            .await?;

        tracing::debug!(
            context = %context,
            provider = self.provider.name(),
            model = %response.model,
            tokens = response.usage.total(),
            json_mode,
            "Completion finished"
        );

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sentinel_core::{JobLevel, ReviewVerdict};

    /// Replies with fixed content and records every request config.
    struct RecordingProvider {
        content: String,
        seen: Mutex<Vec<CompletionConfig>>,
    }

    impl RecordingProvider {
        fn new(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: content.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().push(config.clone());
            Ok(CompletionResponse {
                content: self.content.clone(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_structured_sets_json_mode_and_temperature() {
        let provider = RecordingProvider::new(
            r#"{"keyword_match": true, "visa_sponsorship": true, "job_level": "entry",
                "requires_phd": false, "is_internship": false, "reason": "fits"}"#,
        );
        let client = InferenceClient::new(provider.clone());

        let vote: sentinel_core::EvaluationVote = client
            .complete_structured(&[ChatMessage::user("x")], "test", Some(0.7))
            .await
            .unwrap();
        assert_eq!(vote.job_level, JobLevel::Entry);

        let seen = provider.seen.lock();
        assert!(seen[0].json_mode);
        assert_eq!(seen[0].temperature, 0.7);
    }

    #[tokio::test]
    async fn test_text_uses_default_temperature() {
        let provider = RecordingProvider::new("hello");
        let client = InferenceClient::new(provider.clone());

        let text = client
            .complete_text(&[ChatMessage::user("x")], "test", None)
            .await
            .unwrap();
        assert_eq!(text, "hello");

        let seen = provider.seen.lock();
        assert!(!seen[0].json_mode);
        assert_eq!(seen[0].temperature, CompletionConfig::default().temperature);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_schema_error() {
        let provider = RecordingProvider::new("```json\n{\"approved\": true, \"feedback\": \"\"}\n```");
        let client = InferenceClient::new(provider);

        let result = client
            .complete_structured::<ReviewVerdict>(&[ChatMessage::user("x")], "test", None)
            .await;
        assert!(matches!(result, Err(ProviderError::Schema(_))));
    }
}
