//! Per-posting pipeline state machine.
//!
//! ```text
//! Start    --Begin----------------------> Extract
//! Extract  --Skipped | ExtractionFailed-> End
//! Extract  --Extracted------------------> Classify
//! Classify --ClassificationFailed-------> End
//! Classify --RateLimited----------------> End
//! Classify --Classified-----------------> Audit | End   (audit enabled?)
//! Audit    --Approved-------------------> End
//! Audit    --Rejected-------------------> Classify | End (retries left?)
//! ```
//!
//! `transition` is pure. The caller owns the retry counter and bumps it when
//! a rejection sends the posting back to `Classify`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a posting currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Extract,
    Classify,
    Audit,
    End,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Extract => "extract",
            Stage::Classify => "classify",
            Stage::Audit => "audit",
            Stage::End => "end",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::End
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the stage that just ran reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Begin,
    Skipped,
    ExtractionFailed,
    Extracted,
    ClassificationFailed,
    RateLimited,
    Classified,
    Approved,
    Rejected,
}

/// Retry bookkeeping consulted by the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStatus {
    pub retry_count: u32,
    pub max_retries: u32,
    pub audit_enabled: bool,
}

impl RetryStatus {
    pub fn new(max_retries: u32, audit_enabled: bool) -> Self {
        Self {
            retry_count: 0,
            max_retries,
            audit_enabled,
        }
    }

    pub fn retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition: {outcome:?} is not a valid outcome of stage {stage}")]
    InvalidTransition { stage: Stage, outcome: Outcome },
}

/// Next stage for `(stage, outcome)`.
pub fn transition(
    stage: Stage,
    outcome: Outcome,
    status: RetryStatus,
) -> Result<Stage, TransitionError> {
    use Outcome::*;

    let next = match (stage, outcome) {
        (Stage::Start, Begin) => Stage::Extract,

        (Stage::Extract, Skipped | ExtractionFailed) => Stage::End,
        (Stage::Extract, Extracted) => Stage::Classify,

        (Stage::Classify, ClassificationFailed | RateLimited) => Stage::End,
        (Stage::Classify, Classified) if status.audit_enabled => Stage::Audit,
        (Stage::Classify, Classified) => Stage::End,

        (Stage::Audit, Approved) => Stage::End,
        (Stage::Audit, Rejected) if status.retries_left() => Stage::Classify,
        (Stage::Audit, Rejected) => Stage::End,

        (stage, outcome) => return Err(TransitionError::InvalidTransition { stage, outcome }),
    };

    Ok(next)
}
