//! # sentinel-core
//!
//! Deterministic half of the job posting classification pipeline.
//!
//! This crate holds everything that does not talk to a model:
//! - the shared data model (postings, summaries, votes, evaluations)
//! - the rule engine that reads fields straight off a structured summary
//! - consensus over ensemble votes
//! - the per-posting state machine
//! - JSON schema validation and repair of model output
//! - candidate screening of finished evaluations
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: rules, consensus and transitions are pure
//! 2. **Rules win**: a field the rule engine decides is never left to a vote
//! 3. **One outcome**: a posting ends skipped, failed or evaluated, never two
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_core::{evaluate_rules, reach_consensus};
//!
//! let rules = evaluate_rules(&summary, &target_roles);
//! let evaluation = reach_consensus(&votes, &rules, &posting);
//! ```

pub mod consensus;
pub mod eligibility;
pub mod pipeline;
pub mod repair;
pub mod rules;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use consensus::{reach_consensus, ConsensusBuilder};
pub use eligibility::{CandidateProfile, Exclusion, Screening, ScreeningStats};
pub use pipeline::{transition, Outcome, RetryStatus, Stage, TransitionError};
pub use repair::{parse_repaired, parse_validated, repair_json, RepairError};
pub use rules::{evaluate_rules, Decision, RuleEngine, RuleOutcome};
pub use schema::{SchemaError, SchemaKind, StructuredOutput};
pub use types::{
    BooleanField, ConsensusEvaluation, EducationLevel, EvaluationVote, JobLevel, Posting,
    PostingOutcome, ReviewVerdict, RoleType, SeniorityLevel, StructuredSummary,
    MAX_KEY_REQUIREMENTS,
};
