//! Retry with exponential backoff for provider calls.
//!
//! Only transient errors are retried. Rate limits fail straight away so the
//! pipeline can fall back to its conservative evaluation instead of
//! hammering a quota that will not recover within the run.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// Backoff parameters. Delays are `base_delay * factor^n`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,

    #[serde(with = "crate::config::humantime_serde")]
    pub base_delay: Duration,

    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_retries)
    }

    /// Run `op`, retrying transient failures.
    ///
    /// `context` tags the warning logged before each retry.
    pub async fn run<T, F, Fut>(&self, context: &str, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        op.retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &ProviderError| e.is_transient())
            .notify(|e: &ProviderError, delay: Duration| {
                tracing::warn!(
                    context = %context,
                    error = %e,
                    delay = ?delay,
                    "Transient provider error, retrying"
                );
            })
            .await
    }
}
