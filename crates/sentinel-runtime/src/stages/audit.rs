//! Reviewer pass over a consensus evaluation.

use sentinel_core::{ConsensusEvaluation, Posting, ReviewVerdict, StructuredSummary};

use super::structured_with_fallback;
use crate::client::InferenceClient;
use crate::prompts::{audit_prompt, AUDIT_SYSTEM};
use crate::providers::ChatMessage;

/// Reviews a consensus evaluation against its summary.
///
/// Never fails: if the reviewer cannot produce a verdict the evaluation is
/// approved as is.
#[derive(Debug, Clone)]
pub struct AuditStage {
    client: InferenceClient,
}

impl AuditStage {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    pub async fn run(
        &self,
        posting: &Posting,
        summary: &StructuredSummary,
        evaluation: &ConsensusEvaluation,
        target_roles: &[String],
    ) -> ReviewVerdict {
        let label = posting.label();
        let messages = [
            ChatMessage::system(AUDIT_SYSTEM),
            ChatMessage::user(audit_prompt(summary, evaluation, target_roles)),
        ];
        let context = format!("audit {}", label);

        match structured_with_fallback::<ReviewVerdict>(&self.client, &messages, &context, None)
            .await
        {
            Ok(verdict) => {
                tracing::info!(
                    posting = %label,
                    approved = verdict.approved,
                    confidence = ?verdict.confidence,
                    gaps = verdict.gaps.len(),
                    "REVIEWED"
                );
                verdict
            }
            Err(e) => {
                tracing::warn!(posting = %label, error = %e, "Reviewer failed, auto-approving");
                ReviewVerdict::auto_approved(format!("Reviewer unavailable: {}", e))
            }
        }
    }
}
