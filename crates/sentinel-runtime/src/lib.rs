//! # sentinel-runtime
//!
//! LLM-backed stages and the pipeline controller for Sentinel.
//!
//! Everything deterministic (rules, consensus, the stage machine, JSON
//! repair, screening) lives in `sentinel-core`. This crate adds:
//! - Providers behind [`LlmProvider`], created through a [`ProviderRegistry`]
//! - [`InferenceClient`] with retry and schema-validated structured output
//! - The extraction, ensemble and audit stages
//! - [`PipelineController`] and [`BatchRunner`]
//! - The persistent [`FeedbackStore`] of reviewer corrections
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_runtime::{BatchRunner, PipelineController, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("sentinel.yaml")?;
//! let controller = PipelineController::builder().config(config.clone()).build()?;
//! let runner = BatchRunner::from_config(Arc::new(controller), &config);
//!
//! let reports = runner.run(postings, &["data analyst".to_string()]).await;
//! ```

use thiserror::Error;

pub mod client;
pub mod config;
pub mod feedback;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod stages;

pub use client::InferenceClient;
pub use config::{
    BatchConfig, ConfigError, EnsembleConfig, FeedbackConfig, PipelineConfig, ProviderSettings,
    RuntimeConfig,
};
pub use feedback::{
    FeedbackError, FeedbackRecord, FeedbackSnapshot, FeedbackStore, JsonlFeedbackStore,
    MemoryFeedbackStore,
};
pub use orchestrator::{
    BatchRunner, PipelineBuilder, PipelineController, PipelineState, PostingReport, StageCounters,
};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, ErrorKind, LlmProvider, ProviderError,
    ProviderRegistry, TokenUsage,
};
pub use resilience::RetryPolicy;
pub use stages::{AuditStage, EnsembleStage, Extraction, ExtractionStage, StageError};

/// Errors from assembling or configuring the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}
