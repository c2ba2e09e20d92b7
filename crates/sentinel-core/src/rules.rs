//! Deterministic Rule Engine
//!
//! **Question**: What can be read straight off the structured summary?
//!
//! Every field this engine decides overrides the ensemble's vote. Fields it
//! cannot resolve without semantic judgment are left `Undecided`.
//!
//! ## Field Rules
//!
//! | Field | Decided as |
//! |-------|------------|
//! | `visa_sponsorship` | `true` when no statements; `false` on any denial phrase |
//! | `is_internship` | internship flag, or intern-like word in the normalized title |
//! | `requires_phd` | `education_required == phd` |
//! | `job_level` | internship, senior tiers, mid, years buckets, entry/junior pass-through |
//! | `keyword_match` | never (title-to-role matching is semantic) |

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{BooleanField, EducationLevel, JobLevel, SeniorityLevel, StructuredSummary};

/// Phrases that mark a visa statement as a denial.
pub const VISA_DENIAL_PHRASES: &[&str] = &[
    "must be",
    "no visa",
    "without sponsorship",
    "u.s. person",
    "us citizen",
    "u.s. citizen",
    "without the need for",
    "not available",
];

/// Title words that mark an internship-like role.
pub const INTERNSHIP_TITLE_WORDS: &[&str] =
    &["intern", "internship", "co-op", "fellowship", "apprenticeship"];

fn phrase_pattern(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)(?:{})", alternation)).unwrap()
}

lazy_static! {
    // Substring match, case-insensitive
    static ref VISA_DENIAL_PATTERN: Regex = phrase_pattern(VISA_DENIAL_PHRASES);
    static ref INTERNSHIP_TITLE_PATTERN: Regex = phrase_pattern(INTERNSHIP_TITLE_WORDS);
}

/// A field value resolved by rule, or deferred to the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Decision<T> {
    Decided(T),
    Undecided,
}

impl<T: Copy> Decision<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Decision::Decided(v) => Some(v),
            Decision::Undecided => None,
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, Decision::Decided(_))
    }
}

/// Rule-derived values for every evaluation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub keyword_match: Decision<bool>,
    pub visa_sponsorship: Decision<bool>,
    pub is_internship: Decision<bool>,
    pub requires_phd: Decision<bool>,
    pub job_level: Decision<JobLevel>,
}

impl RuleOutcome {
    pub fn flag(&self, field: BooleanField) -> Decision<bool> {
        match field {
            BooleanField::KeywordMatch => self.keyword_match,
            BooleanField::VisaSponsorship => self.visa_sponsorship,
            BooleanField::RequiresPhd => self.requires_phd,
            BooleanField::IsInternship => self.is_internship,
        }
    }

    /// Names of fields left to the ensemble.
    pub fn undecided_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = BooleanField::ALL
            .iter()
            .filter(|f| !self.flag(**f).is_decided())
            .map(|f| f.name())
            .collect();
        if !self.job_level.is_decided() {
            fields.push("job_level");
        }
        fields
    }
}

/// The deterministic rule engine. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule against a summary.
    ///
    /// Target roles are accepted for symmetry with the ensemble; keyword
    /// matching needs semantic comparison and is never decided here.
    pub fn evaluate(&self, summary: &StructuredSummary, _target_roles: &[String]) -> RuleOutcome {
        let visa_sponsorship = Decision::Decided(self.visa_sponsorship(&summary.visa_statements));
        let is_internship = self.is_internship(summary);
        let requires_phd = Decision::Decided(summary.education_required == EducationLevel::Phd);
        let job_level = self.job_level(summary, is_internship);

        RuleOutcome {
            keyword_match: Decision::Undecided,
            visa_sponsorship,
            is_internship: Decision::Decided(is_internship),
            requires_phd,
            job_level,
        }
    }

    /// Silence is permissive; any denial phrase in any statement is not.
    fn visa_sponsorship(&self, statements: &[String]) -> bool {
        if statements.is_empty() {
            return true;
        }
        !statements.iter().any(|s| VISA_DENIAL_PATTERN.is_match(s))
    }

    fn is_internship(&self, summary: &StructuredSummary) -> bool {
        summary.is_internship_coop || INTERNSHIP_TITLE_PATTERN.is_match(&summary.title_normalized)
    }

    fn job_level(&self, summary: &StructuredSummary, is_internship: bool) -> Decision<JobLevel> {
        if is_internship {
            return Decision::Decided(JobLevel::Internship);
        }

        let seniority = summary.seniority_level;
        if seniority.is_senior_tier() {
            return Decision::Decided(JobLevel::Senior);
        }
        if seniority == SeniorityLevel::Mid {
            return Decision::Decided(JobLevel::Mid);
        }

        match (summary.years_experience_required, seniority) {
            (Some(years), _) => Decision::Decided(JobLevel::from_years(years)),
            (None, SeniorityLevel::Entry) => Decision::Decided(JobLevel::Entry),
            (None, SeniorityLevel::Junior) => Decision::Decided(JobLevel::Junior),
            _ => Decision::Undecided,
        }
    }
}

/// Convenience wrapper around [`RuleEngine::evaluate`].
pub fn evaluate_rules(summary: &StructuredSummary, target_roles: &[String]) -> RuleOutcome {
    RuleEngine::new().evaluate(summary, target_roles)
}
