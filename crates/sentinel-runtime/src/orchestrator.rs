//! Pipeline controller and batch runner.
//!
//! The controller walks one posting through the stage machine from
//! `sentinel_core::pipeline`:
//! - Extract once (a summary already in the state is reused)
//! - Classify with the ensemble, carrying any pending audit feedback
//! - Audit, sending rejected evaluations back to Classify while retries last
//!
//! The batch runner fans postings out in fixed-size concurrent batches with
//! a cooldown between batches.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use sentinel_core::{
    transition, CandidateProfile, ConsensusEvaluation, Outcome, Posting, PostingOutcome,
    RetryStatus, ReviewVerdict, Screening, Stage, StructuredSummary, TransitionError,
};

use crate::client::InferenceClient;
use crate::config::{BatchConfig, PipelineConfig, RuntimeConfig};
use crate::feedback::{FeedbackRecord, FeedbackSnapshot, FeedbackStore, JsonlFeedbackStore};
use crate::providers::ProviderRegistry;
use crate::stages::{AuditStage, EnsembleStage, Extraction, ExtractionStage};
use crate::RuntimeError;

/// Model calls made per stage for one posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    pub extractions: u32,
    pub classifications: u32,
    pub audits: u32,
}

/// Mutable state of one posting while the controller drives it.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub posting: Posting,
    pub target_roles: Vec<String>,
    pub stage: Stage,
    pub summary: Option<StructuredSummary>,
    pub evaluation: Option<ConsensusEvaluation>,
    /// Audit feedback for the next classification only.
    pub review_feedback: Option<String>,
    pub verdict: Option<ReviewVerdict>,
    pub retry: RetryStatus,
    pub corrections: FeedbackSnapshot,
    pub skipped: Option<String>,
    pub error: Option<String>,
    pub counters: StageCounters,
}

impl PipelineState {
    pub fn new(
        posting: Posting,
        target_roles: Vec<String>,
        corrections: FeedbackSnapshot,
        retry: RetryStatus,
    ) -> Self {
        Self {
            posting,
            target_roles,
            stage: Stage::Start,
            summary: None,
            evaluation: None,
            review_feedback: None,
            verdict: None,
            retry,
            corrections,
            skipped: None,
            error: None,
            counters: StageCounters::default(),
        }
    }

    /// Terminal outcome. An evaluation from an earlier attempt wins over a
    /// later classification error.
    pub fn outcome(&self) -> PostingOutcome {
        if let Some(reason) = &self.skipped {
            return PostingOutcome::Skipped {
                reason: reason.clone(),
            };
        }
        if let Some(evaluation) = &self.evaluation {
            return PostingOutcome::Evaluated {
                evaluation: evaluation.clone(),
            };
        }
        PostingOutcome::Failed {
            error: self
                .error
                .clone()
                .unwrap_or_else(|| "Pipeline ended without an evaluation".to_string()),
        }
    }

    pub fn into_report(self) -> PostingReport {
        PostingReport {
            outcome: self.outcome(),
            retries: self.retry.retry_count,
            posting: self.posting,
            summary: self.summary,
            verdict: self.verdict,
            counters: self.counters,
        }
    }
}

/// Everything downstream consumers get for one posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingReport {
    pub posting: Posting,
    pub outcome: PostingOutcome,
    pub summary: Option<StructuredSummary>,
    /// Last audit verdict, if the posting was audited.
    pub verdict: Option<ReviewVerdict>,
    /// Audit rejections that sent the posting back to classification.
    pub retries: u32,
    pub counters: StageCounters,
}

impl PostingReport {
    pub fn screen(&self, profile: &CandidateProfile) -> Screening {
        profile.screen(&self.outcome)
    }

    /// Feedback of a rejection the retries did not resolve.
    pub fn rejection(&self) -> Option<&str> {
        self.verdict
            .as_ref()
            .filter(|v| !v.approved)
            .map(|v| v.feedback.as_str())
            .filter(|f| !f.trim().is_empty())
    }
}

/// Drives single postings through extraction, classification and audit.
#[derive(Debug, Clone)]
pub struct PipelineController {
    extraction: ExtractionStage,
    ensemble: EnsembleStage,
    audit: AuditStage,
    pipeline: PipelineConfig,
}

impl PipelineController {
    pub fn new(
        extraction: ExtractionStage,
        ensemble: EnsembleStage,
        audit: AuditStage,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            extraction,
            ensemble,
            audit,
            pipeline,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Run one posting to completion. Never fails; problems end up in the
    /// report's outcome.
    pub async fn run(
        &self,
        posting: Posting,
        target_roles: &[String],
        corrections: &FeedbackSnapshot,
    ) -> PostingReport {
        let retry = RetryStatus::new(self.pipeline.max_retries, self.pipeline.audit_enabled);
        let mut state =
            PipelineState::new(posting, target_roles.to_vec(), corrections.clone(), retry);

        if let Err(e) = self.drive(&mut state).await {
            tracing::error!(posting = %state.posting.label(), error = %e, "Pipeline aborted");
            state.error = Some(e.to_string());
            state.stage = Stage::End;
        }

        state.into_report()
    }

    /// Step `state` until it reaches [`Stage::End`].
    pub async fn drive(&self, state: &mut PipelineState) -> Result<(), TransitionError> {
        while !state.stage.is_terminal() {
            let outcome = match state.stage {
                Stage::Start => Outcome::Begin,
                Stage::Extract => self.extract(state).await,
                Stage::Classify => self.classify(state).await,
                Stage::Audit => self.review(state).await,
                Stage::End => break,
            };

            let next = transition(state.stage, outcome, state.retry)?;
            if state.stage == Stage::Audit && next == Stage::Classify {
                state.retry.retry_count += 1;
                tracing::info!(
                    posting = %state.posting.label(),
                    attempt = state.retry.retry_count,
                    max = state.retry.max_retries,
                    "Audit rejected evaluation, reclassifying"
                );
            }
            tracing::debug!(
                posting = %state.posting.label(),
                from = %state.stage,
                to = %next,
                outcome = ?outcome,
                "Stage transition"
            );
            state.stage = next;
        }
        Ok(())
    }

    async fn extract(&self, state: &mut PipelineState) -> Outcome {
        if state.summary.is_some() {
            tracing::debug!(posting = %state.posting.label(), "Summary present, skipping extraction");
            return Outcome::Extracted;
        }

        let result = self
            .extraction
            .run(&state.posting, &state.target_roles)
            .await;
        match result {
            Ok(Extraction::Skipped(reason)) => {
                state.skipped = Some(reason);
                Outcome::Skipped
            }
            Ok(Extraction::Summary(summary)) => {
                state.counters.extractions += 1;
                state.summary = Some(summary);
                Outcome::Extracted
            }
            Err(e) => {
                state.counters.extractions += 1;
                state.error = Some(e.to_string());
                Outcome::ExtractionFailed
            }
        }
    }

    async fn classify(&self, state: &mut PipelineState) -> Outcome {
        let Some(summary) = state.summary.as_ref() else {
            state.error = Some("No summary available for classification".to_string());
            return Outcome::ClassificationFailed;
        };

        let result = self
            .ensemble
            .run(
                &state.posting,
                summary,
                &state.target_roles,
                state.corrections.entries(),
                state.review_feedback.as_deref(),
            )
            .await;
        state.counters.classifications += 1;
        state.review_feedback = None;

        match result {
            Ok(evaluation) => {
                let rate_limited = evaluation.rate_limited;
                state.evaluation = Some(evaluation);
                if rate_limited {
                    Outcome::RateLimited
                } else {
                    Outcome::Classified
                }
            }
            Err(e) => {
                tracing::warn!(posting = %state.posting.label(), error = %e, "Classification failed");
                state.error = Some(e.to_string());
                Outcome::ClassificationFailed
            }
        }
    }

    async fn review(&self, state: &mut PipelineState) -> Outcome {
        let (Some(summary), Some(evaluation)) = (state.summary.as_ref(), state.evaluation.as_ref())
        else {
            tracing::warn!(posting = %state.posting.label(), "Nothing to review, approving");
            return Outcome::Approved;
        };

        let verdict = self
            .audit
            .run(&state.posting, summary, evaluation, &state.target_roles)
            .await;
        state.counters.audits += 1;

        let outcome = if verdict.approved {
            Outcome::Approved
        } else {
            state.review_feedback = Some(verdict.feedback.clone());
            Outcome::Rejected
        };
        state.verdict = Some(verdict);
        outcome
    }
}

/// Builder for [`PipelineController`].
///
/// Stage clients not set explicitly are created from the configuration
/// through the provider registry.
pub struct PipelineBuilder {
    config: RuntimeConfig,
    registry: Option<ProviderRegistry>,
    extraction: Option<InferenceClient>,
    classification: Option<InferenceClient>,
    audit: Option<InferenceClient>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: None,
            extraction: None,
            classification: None,
            audit: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Registry used for clients built from configuration.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use one client for every stage.
    pub fn client(mut self, client: InferenceClient) -> Self {
        self.extraction = Some(client.clone());
        self.classification = Some(client.clone());
        self.audit = Some(client);
        self
    }

    pub fn extraction_client(mut self, client: InferenceClient) -> Self {
        self.extraction = Some(client);
        self
    }

    pub fn classification_client(mut self, client: InferenceClient) -> Self {
        self.classification = Some(client);
        self
    }

    pub fn audit_client(mut self, client: InferenceClient) -> Self {
        self.audit = Some(client);
        self
    }

    pub fn build(self) -> Result<PipelineController, RuntimeError> {
        self.config.validate()?;
        let registry = self.registry.unwrap_or_else(ProviderRegistry::with_defaults);
        let retry = self.config.retry;

        let extraction = match self.extraction {
            Some(client) => client,
            None => self.config.extraction.build_client(&registry, retry)?,
        };
        let classification = match self.classification {
            Some(client) => client,
            None => self.config.classification.build_client(&registry, retry)?,
        };
        // Audit is never called when disabled, so a missing provider is fine
        let audit = match self.audit {
            Some(client) => client,
            None if self.config.pipeline.audit_enabled => {
                self.config.audit.build_client(&registry, retry)?
            }
            None => classification.clone(),
        };

        tracing::debug!(
            extraction = %extraction.model(),
            classification = %classification.model(),
            audit = %audit.model(),
            members = self.config.ensemble.size(),
            "Pipeline built"
        );

        Ok(PipelineController::new(
            ExtractionStage::new(extraction),
            EnsembleStage::new(classification, self.config.ensemble.temperatures.clone()),
            AuditStage::new(audit),
            self.config.pipeline,
        ))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs many postings in concurrent batches.
pub struct BatchRunner {
    controller: Arc<PipelineController>,
    batch: BatchConfig,
    feedback: Arc<dyn FeedbackStore>,
    max_feedback: usize,
}

impl BatchRunner {
    pub fn new(
        controller: Arc<PipelineController>,
        batch: BatchConfig,
        feedback: Arc<dyn FeedbackStore>,
        max_feedback: usize,
    ) -> Self {
        Self {
            controller,
            batch,
            feedback,
            max_feedback,
        }
    }

    /// Batch and feedback settings from `config`, with a JSONL store at
    /// `feedback.path`.
    pub fn from_config(controller: Arc<PipelineController>, config: &RuntimeConfig) -> Self {
        Self::new(
            controller,
            config.batch,
            Arc::new(JsonlFeedbackStore::new(config.feedback.path.clone())),
            config.feedback.max_entries,
        )
    }

    /// Process every posting, returning reports in input order.
    pub async fn run(&self, postings: Vec<Posting>, target_roles: &[String]) -> Vec<PostingReport> {
        let total = postings.len();
        if total == 0 {
            return Vec::new();
        }

        let snapshot = FeedbackSnapshot::load(self.feedback.as_ref(), self.max_feedback).await;
        let size = self.batch.size.max(1);
        let batches = total.div_ceil(size);
        tracing::info!(total, batch_size = size, batches, "Starting batch run");

        let mut reports = Vec::with_capacity(total);
        for (index, batch) in postings.chunks(size).enumerate() {
            let finished = join_all(
                batch
                    .iter()
                    .map(|posting| self.controller.run(posting.clone(), target_roles, &snapshot)),
            )
            .await;

            self.save_rejections(&finished).await;
            reports.extend(finished);
            tracing::info!(
                batch = index + 1,
                batches,
                done = reports.len(),
                total,
                "Batch finished"
            );

            if index + 1 < batches && !self.batch.cooldown.is_zero() {
                tracing::debug!(cooldown = ?self.batch.cooldown, "Cooling down between batches");
                tokio::time::sleep(self.batch.cooldown).await;
            }
        }

        reports
    }

    async fn save_rejections(&self, reports: &[PostingReport]) {
        for report in reports {
            if let Some(feedback) = report.rejection() {
                let record = FeedbackRecord::new(&report.posting, feedback);
                if let Err(e) = self.feedback.append(record).await {
                    tracing::warn!(
                        posting = %report.posting.label(),
                        error = %e,
                        "Could not save reviewer feedback"
                    );
                }
            }
        }
    }
}
