//! Shared data model for the classification pipeline.
//!
//! Everything here is plain data: postings coming in, the structured summary
//! produced by extraction, ensemble votes, and the consensus evaluation that
//! leaves the pipeline.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Maximum number of key requirements kept on a summary.
pub const MAX_KEY_REQUIREMENTS: usize = 8;

/// Years may arrive as `3` or `3.0`; only whole non-negative values are kept.
fn whole_years<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(y) if y >= 0.0 && y.fract() == 0.0 && y <= f64::from(u32::MAX) => Ok(Some(y as u32)),
        Some(y) => Err(de::Error::custom(format!(
            "years_experience_required must be a whole number, got {}",
            y
        ))),
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

/// A raw job posting as handed over by the posting source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Posting {
    #[serde(default = "unknown")]
    pub title: String,

    #[serde(default = "unknown")]
    pub company: String,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl Posting {
    /// Create a posting with a description.
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            location: None,
            description: Some(description.into()),
        }
    }

    /// Set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// `"Title @ Company"`, used to tag log lines.
    pub fn label(&self) -> String {
        format!("{} @ {}", self.title, self.company)
    }
}

/// Professional function category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    SoftwareEngineering,
    DataScience,
    DataEngineering,
    DataAnalysis,
    ProductManagement,
    ProjectManagement,
    Design,
    Devops,
    Security,
    Qa,
    #[serde(other)]
    Other,
}

/// Seniority tier as stated or implied by the posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeniorityLevel {
    Intern,
    Entry,
    Junior,
    Mid,
    Senior,
    Lead,
    Staff,
    Principal,
    Director,
    Vp,
    #[serde(other)]
    Unknown,
}

impl SeniorityLevel {
    /// Tiers that always mean a senior position.
    pub fn is_senior_tier(self) -> bool {
        matches!(
            self,
            SeniorityLevel::Senior
                | SeniorityLevel::Lead
                | SeniorityLevel::Staff
                | SeniorityLevel::Principal
                | SeniorityLevel::Director
                | SeniorityLevel::Vp
        )
    }
}

/// Minimum education level required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    None,
    HighSchool,
    Bachelors,
    Masters,
    Phd,
    #[serde(other)]
    Unknown,
}

/// Fixed-shape summary extracted from one posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredSummary {
    pub title_normalized: String,
    pub role_type: RoleType,
    pub seniority_level: SeniorityLevel,
    #[serde(default, deserialize_with = "whole_years")]
    pub years_experience_required: Option<u32>,
    pub education_required: EducationLevel,
    #[serde(default)]
    pub visa_statements: Vec<String>,
    pub is_internship_coop: bool,
    #[serde(default)]
    pub key_requirements: Vec<String>,
    pub description_summary: String,
}

impl StructuredSummary {
    /// Clamp model output to the documented shape.
    pub fn normalized(mut self) -> Self {
        self.key_requirements.truncate(MAX_KEY_REQUIREMENTS);
        self.title_normalized = self.title_normalized.trim().to_string();
        self
    }
}

/// Ordered job level, most junior first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLevel {
    Internship,
    Entry,
    Junior,
    Mid,
    Senior,
}

impl JobLevel {
    /// All levels in rank order.
    pub const ALL: [JobLevel; 5] = [
        JobLevel::Internship,
        JobLevel::Entry,
        JobLevel::Junior,
        JobLevel::Mid,
        JobLevel::Senior,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobLevel::Internship => "internship",
            JobLevel::Entry => "entry",
            JobLevel::Junior => "junior",
            JobLevel::Mid => "mid",
            JobLevel::Senior => "senior",
        }
    }

    /// Boolean "entry level" view of the level.
    pub fn is_entry_level(self) -> bool {
        matches!(self, JobLevel::Internship | JobLevel::Entry)
    }

    /// Bucket required years: >=5 senior, >=3 mid, >=1 junior, 0 entry.
    pub fn from_years(years: u32) -> Self {
        match years {
            y if y >= 5 => JobLevel::Senior,
            y if y >= 3 => JobLevel::Mid,
            y if y >= 1 => JobLevel::Junior,
            _ => JobLevel::Entry,
        }
    }
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internship" | "intern" => Ok(JobLevel::Internship),
            "entry" => Ok(JobLevel::Entry),
            "junior" => Ok(JobLevel::Junior),
            "mid" => Ok(JobLevel::Mid),
            "senior" => Ok(JobLevel::Senior),
            other => Err(format!("unknown job level '{}'", other)),
        }
    }
}

/// Boolean fields shared by votes and consensus evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanField {
    KeywordMatch,
    VisaSponsorship,
    RequiresPhd,
    IsInternship,
}

impl BooleanField {
    pub const ALL: [BooleanField; 4] = [
        BooleanField::KeywordMatch,
        BooleanField::VisaSponsorship,
        BooleanField::RequiresPhd,
        BooleanField::IsInternship,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BooleanField::KeywordMatch => "keyword_match",
            BooleanField::VisaSponsorship => "visa_sponsorship",
            BooleanField::RequiresPhd => "requires_phd",
            BooleanField::IsInternship => "is_internship",
        }
    }
}

/// One ensemble member's opinion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationVote {
    pub keyword_match: bool,
    pub visa_sponsorship: bool,
    pub job_level: JobLevel,
    pub requires_phd: bool,
    pub is_internship: bool,
    #[serde(default)]
    pub reason: String,
}

impl EvaluationVote {
    pub fn flag(&self, field: BooleanField) -> bool {
        match field {
            BooleanField::KeywordMatch => self.keyword_match,
            BooleanField::VisaSponsorship => self.visa_sponsorship,
            BooleanField::RequiresPhd => self.requires_phd,
            BooleanField::IsInternship => self.is_internship,
        }
    }
}

/// Final field-wise evaluation of a posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusEvaluation {
    pub keyword_match: bool,
    pub visa_sponsorship: bool,
    pub job_level: JobLevel,
    pub requires_phd: bool,
    pub is_internship: bool,
    pub reason: String,
    pub job_title: String,
    pub company: String,
    /// Number of ensemble votes that survived.
    #[serde(default)]
    pub votes: usize,
    /// Set only on the conservative evaluation produced after a rate limit.
    #[serde(default)]
    pub rate_limited: bool,
}

impl ConsensusEvaluation {
    /// Reason attached to the conservative rate-limit evaluation.
    pub const RATE_LIMITED_REASON: &'static str = "Rate limited (429) - filtered out";

    /// Maximally restrictive evaluation so a rate-limited posting is dropped.
    pub fn conservative(posting: &Posting) -> Self {
        Self {
            keyword_match: false,
            visa_sponsorship: false,
            job_level: JobLevel::Senior,
            requires_phd: true,
            is_internship: true,
            reason: Self::RATE_LIMITED_REASON.to_string(),
            job_title: posting.title.clone(),
            company: posting.company.clone(),
            votes: 0,
            rate_limited: true,
        }
    }

    pub fn flag(&self, field: BooleanField) -> bool {
        match field {
            BooleanField::KeywordMatch => self.keyword_match,
            BooleanField::VisaSponsorship => self.visa_sponsorship,
            BooleanField::RequiresPhd => self.requires_phd,
            BooleanField::IsInternship => self.is_internship,
        }
    }

    pub fn set_flag(&mut self, field: BooleanField, value: bool) {
        match field {
            BooleanField::KeywordMatch => self.keyword_match = value,
            BooleanField::VisaSponsorship => self.visa_sponsorship = value,
            BooleanField::RequiresPhd => self.requires_phd = value,
            BooleanField::IsInternship => self.is_internship = value,
        }
    }

    pub fn is_entry_level(&self) -> bool {
        self.job_level.is_entry_level()
    }
}

/// Audit reviewer's verdict on a consensus evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub confidence: Option<u8>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub gaps: Vec<String>,
}

impl ReviewVerdict {
    /// Verdict recorded when the reviewer itself could not run.
    pub fn auto_approved(why: impl Into<String>) -> Self {
        Self {
            approved: true,
            confidence: None,
            feedback: why.into(),
            gaps: Vec::new(),
        }
    }
}

/// The single terminal outcome of one posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostingOutcome {
    /// Input too thin to evaluate.
    Skipped { reason: String },

    /// The pipeline failed before producing an evaluation.
    Failed { error: String },

    /// A consensus evaluation was produced.
    Evaluated { evaluation: ConsensusEvaluation },
}

impl PostingOutcome {
    pub fn evaluation(&self) -> Option<&ConsensusEvaluation> {
        match self {
            PostingOutcome::Evaluated { evaluation } => Some(evaluation),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PostingOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PostingOutcome::Failed { .. })
    }
}
