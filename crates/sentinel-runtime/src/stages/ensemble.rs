//! Ensemble classification.
//!
//! Every member votes independently at its own temperature. The votes are
//! merged by `sentinel_core::consensus`, and deterministic rule decisions
//! override the models.

use futures::future::join_all;
use sentinel_core::consensus::{majority, plurality_level};
use sentinel_core::{
    BooleanField, ConsensusBuilder, ConsensusEvaluation, Decision, EvaluationVote, Posting,
    RuleEngine, RuleOutcome, StructuredSummary,
};

use super::{structured_with_fallback, StageError};
use crate::client::InferenceClient;
use crate::prompts::{classification_prompt, CLASSIFICATION_SYSTEM};
use crate::providers::{ChatMessage, ProviderError};

/// Classification by an ensemble of independent votes.
///
/// Members run concurrently and fail independently. Surviving votes are
/// reduced by [`ConsensusBuilder`], with decided rule fields overriding the
/// vote. When every member fails and at least one was rate limited the
/// stage returns the conservative evaluation instead of an error.
#[derive(Debug, Clone)]
pub struct EnsembleStage {
    client: InferenceClient,
    temperatures: Vec<f32>,
    rules: RuleEngine,
    consensus: ConsensusBuilder,
}

impl EnsembleStage {
    /// One member per entry in `temperatures`.
    pub fn new(client: InferenceClient, temperatures: Vec<f32>) -> Self {
        Self {
            client,
            temperatures,
            rules: RuleEngine::new(),
            consensus: ConsensusBuilder::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.temperatures.len()
    }

    pub async fn run(
        &self,
        posting: &Posting,
        summary: &StructuredSummary,
        target_roles: &[String],
        corrections: &[String],
        review_feedback: Option<&str>,
    ) -> Result<ConsensusEvaluation, StageError> {
        let label = posting.label();
        let messages = [
            ChatMessage::system(CLASSIFICATION_SYSTEM),
            ChatMessage::user(classification_prompt(
                summary,
                target_roles,
                corrections,
                review_feedback,
            )),
        ];

        let calls = self.temperatures.iter().enumerate().map(|(member, t)| {
            let context = format!("classify[{}] {}", member, label);
            let messages = &messages;
            async move {
                structured_with_fallback::<EvaluationVote>(
                    &self.client,
                    messages,
                    &context,
                    Some(*t),
                )
                .await
            }
        });

        let mut votes = Vec::with_capacity(self.size());
        let mut failures: Vec<ProviderError> = Vec::new();
        for (member, result) in join_all(calls).await.into_iter().enumerate() {
            match result {
                Ok(vote) => votes.push(vote),
                Err(e) => {
                    tracing::warn!(posting = %label, member, error = %e, "Ensemble member failed");
                    failures.push(e);
                }
            }
        }

        if votes.is_empty() {
            if failures.iter().any(ProviderError::is_rate_limited) {
                tracing::warn!(posting = %label, "Rate limited, using conservative evaluation");
                return Ok(ConsensusEvaluation::conservative(posting));
            }
            return Err(StageError::AllMembersFailed {
                failures: failures.len(),
                last: failures
                    .last()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "empty ensemble".to_string()),
            });
        }

        let rules = self.rules.evaluate(summary, target_roles);
        log_overrides(&label, &votes, &rules);

        let evaluation = self
            .consensus
            .build(&votes, &rules, posting)
            .ok_or_else(|| StageError::AllMembersFailed {
                failures: failures.len(),
                last: "no votes".to_string(),
            })?;

        tracing::info!(
            posting = %label,
            keyword = evaluation.keyword_match,
            visa = evaluation.visa_sponsorship,
            level = %evaluation.job_level,
            phd = evaluation.requires_phd,
            intern = evaluation.is_internship,
            votes = evaluation.votes,
            "EVALUATED"
        );

        Ok(evaluation)
    }
}

fn log_overrides(label: &str, votes: &[EvaluationVote], rules: &RuleOutcome) {
    for field in BooleanField::ALL {
        if let Decision::Decided(value) = rules.flag(field) {
            let voted = majority(votes, field);
            if voted != value {
                tracing::debug!(
                    posting = %label,
                    field = field.name(),
                    voted,
                    rule = value,
                    "Deterministic override"
                );
            }
        }
    }
    if let Decision::Decided(level) = rules.job_level {
        let voted = plurality_level(votes);
        if voted != level {
            tracing::debug!(
                posting = %label,
                field = "job_level",
                voted = %voted,
                rule = %level,
                "Deterministic override"
            );
        }
    }
}
