//! Extraction: one structured summary per posting.
//!
//! Postings with too little description text are skipped before any model call.

use sentinel_core::{Posting, StructuredSummary};

use super::{structured_with_fallback, StageError};
use crate::client::InferenceClient;
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM};
use crate::providers::ChatMessage;

/// Descriptions shorter than this are skipped without a model call.
pub const MIN_DESCRIPTION_CHARS: usize = 50;

/// Result of the extraction stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Skipped(String),
    Summary(StructuredSummary),
}

/// Turns a raw posting into a [`StructuredSummary`].
#[derive(Debug, Clone)]
pub struct ExtractionStage {
    client: InferenceClient,
}

impl ExtractionStage {
    pub fn new(client: InferenceClient) -> Self {
        Self { client }
    }

    pub async fn run(
        &self,
        posting: &Posting,
        target_roles: &[String],
    ) -> Result<Extraction, StageError> {
        let label = posting.label();
        let chars = posting
            .description
            .as_deref()
            .map_or(0, |d| d.chars().count());

        if chars < MIN_DESCRIPTION_CHARS {
            tracing::debug!(posting = %label, chars, "Description too short, skipping");
            return Ok(Extraction::Skipped(format!(
                "Description too short ({} chars)",
                chars
            )));
        }

        let messages = [
            ChatMessage::system(EXTRACTION_SYSTEM),
            ChatMessage::user(extraction_prompt(posting, target_roles)),
        ];
        let context = format!("extract {}", label);

        let summary: StructuredSummary =
            structured_with_fallback(&self.client, &messages, &context, None)
                .await
                .map_err(|e| {
                    tracing::warn!(posting = %label, error = %e, "Extraction failed");
                    e
                })?;
        let summary = summary.normalized();

        tracing::info!(
            posting = %label,
            role = ?summary.role_type,
            seniority = ?summary.seniority_level,
            years = ?summary.years_experience_required,
            "SUMMARIZED"
        );

        Ok(Extraction::Summary(summary))
    }
}
