//! The three model-backed pipeline stages.
//!
//! - [`ExtractionStage`]: raw posting to [`StructuredSummary`](sentinel_core::StructuredSummary)
//! - [`EnsembleStage`]: N concurrent votes, deterministic rules, consensus
//! - [`AuditStage`]: reviewer verdict on the consensus evaluation
//!
//! Stages hold an [`InferenceClient`] and nothing else stateful; the
//! controller owns all per-posting state.

mod audit;
mod ensemble;
mod extraction;

pub use audit::AuditStage;
pub use ensemble::EnsembleStage;
pub use extraction::{Extraction, ExtractionStage, MIN_DESCRIPTION_CHARS};

use sentinel_core::{repair, StructuredOutput};
use thiserror::Error;

use crate::client::InferenceClient;
use crate::providers::{ChatMessage, ProviderError};

/// Errors from a stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("All {failures} ensemble members failed, last error: {last}")]
    AllMembersFailed { failures: usize, last: String },
}

/// Structured call, falling back to text mode plus JSON repair when the
/// structured reply fails schema validation.
pub(crate) async fn structured_with_fallback<T: StructuredOutput>(
    client: &InferenceClient,
    messages: &[ChatMessage],
    context: &str,
    temperature: Option<f32>,
) -> Result<T, ProviderError> {
    match client
        .complete_structured::<T>(messages, context, temperature)
        .await
    {
        Err(ProviderError::Schema(first)) => {
            tracing::warn!(
                context = %context,
                schema = T::NAME,
                error = %first,
                "Structured output invalid, falling back to text"
            );
            let text = client.complete_text(messages, context, temperature).await?;
            repair::parse_validated::<T>(&text).map_err(|e| ProviderError::Schema(e.to_string()))
        }
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{client, ScriptedProvider};
    use super::*;
    use sentinel_core::ReviewVerdict;

    #[tokio::test]
    async fn test_fallback_repairs_text_reply() {
        let provider = ScriptedProvider::new(vec![
            Ok("not json at all".to_string()),
            Ok("Sure!\n```json\n{\"approved\": false, \"feedback\": \"level is C:\\mid\"}\n```"
                .to_string()),
        ]);
        let client = client(provider.clone());

        let verdict: ReviewVerdict =
            structured_with_fallback(&client, &[ChatMessage::user("x")], "test", None)
                .await
                .unwrap();
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "level is C:mid");
        assert_eq!(provider.calls(), 2);

        let requests = provider.requests.lock();
        assert!(requests[0].1.json_mode);
        assert!(!requests[1].1.json_mode);
    }

    #[tokio::test]
    async fn test_fallback_still_invalid_is_schema_error() {
        let provider = ScriptedProvider::new(vec![
            Ok("{}".to_string()),
            Ok("{\"approved\": \"maybe\"}".to_string()),
        ]);
        let client = client(provider);

        let result: Result<ReviewVerdict, _> =
            structured_with_fallback(&client, &[ChatMessage::user("x")], "test", None).await;
        assert!(matches!(result, Err(ProviderError::Schema(_))));
    }

    #[tokio::test]
    async fn test_provider_error_skips_fallback() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthError)]);
        let client = client(provider.clone());

        let result: Result<ReviewVerdict, _> =
            structured_with_fallback(&client, &[ChatMessage::user("x")], "test", None).await;
        assert!(matches!(result, Err(ProviderError::AuthError)));
        assert_eq!(provider.calls(), 1);
    }
}
