//! Candidate screening over finished postings.
//!
//! Checks run in a fixed order and the first failing one names the
//! exclusion:
//!
//! | # | Check | Exclusion |
//! |---|-------|-----------|
//! | 1 | pipeline failed | `Errored` |
//! | 2 | posting skipped | `Skipped` |
//! | 3 | rate limited | `Errored` |
//! | 4 | no keyword match | `KeywordMismatch` |
//! | 5 | sponsorship needed but not offered | `NoSponsorship` |
//! | 6 | level not accepted | `Level` |
//! | 7 | PhD required | `RequiresPhd` |
//! | 8 | internship (unless accepted) | `Internship` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{JobLevel, PostingOutcome};

/// What the candidate is looking for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateProfile {
    #[serde(default)]
    pub needs_sponsorship: bool,

    #[serde(default = "default_levels")]
    pub accepted_levels: BTreeSet<JobLevel>,

    #[serde(default)]
    pub target_roles: Vec<String>,
}

fn default_levels() -> BTreeSet<JobLevel> {
    BTreeSet::from([JobLevel::Entry])
}

impl Default for CandidateProfile {
    fn default() -> Self {
        Self {
            needs_sponsorship: false,
            accepted_levels: default_levels(),
            target_roles: Vec::new(),
        }
    }
}

impl CandidateProfile {
    pub fn new(target_roles: Vec<String>) -> Self {
        Self {
            target_roles,
            ..Self::default()
        }
    }

    pub fn with_sponsorship(mut self, needs_sponsorship: bool) -> Self {
        self.needs_sponsorship = needs_sponsorship;
        self
    }

    /// Replace the accepted levels. An empty iterator keeps the default.
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = JobLevel>) -> Self {
        let levels: BTreeSet<JobLevel> = levels.into_iter().collect();
        if !levels.is_empty() {
            self.accepted_levels = levels;
        }
        self
    }

    /// Screen one finished posting.
    pub fn screen(&self, outcome: &PostingOutcome) -> Screening {
        let evaluation = match outcome {
            PostingOutcome::Failed { .. } => return Screening::Excluded(Exclusion::Errored),
            PostingOutcome::Skipped { .. } => return Screening::Excluded(Exclusion::Skipped),
            PostingOutcome::Evaluated { evaluation } => evaluation,
        };

        let exclusion = if evaluation.rate_limited {
            Some(Exclusion::Errored)
        } else if !evaluation.keyword_match {
            Some(Exclusion::KeywordMismatch)
        } else if self.needs_sponsorship && !evaluation.visa_sponsorship {
            Some(Exclusion::NoSponsorship)
        } else if !self.accepted_levels.contains(&evaluation.job_level) {
            Some(Exclusion::Level)
        } else if evaluation.requires_phd {
            Some(Exclusion::RequiresPhd)
        } else if evaluation.is_internship
            && !self.accepted_levels.contains(&JobLevel::Internship)
        {
            Some(Exclusion::Internship)
        } else {
            None
        };

        match exclusion {
            Some(reason) => Screening::Excluded(reason),
            None => Screening::Accepted,
        }
    }
}

/// Why a posting was screened out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    Errored,
    Skipped,
    KeywordMismatch,
    NoSponsorship,
    Level,
    RequiresPhd,
    Internship,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Exclusion::Errored => "errored",
            Exclusion::Skipped => "skipped",
            Exclusion::KeywordMismatch => "keyword mismatch",
            Exclusion::NoSponsorship => "no sponsorship",
            Exclusion::Level => "level",
            Exclusion::RequiresPhd => "requires phd",
            Exclusion::Internship => "internship",
        };
        f.write_str(s)
    }
}

/// Result of screening one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screening", content = "reason", rename_all = "snake_case")]
pub enum Screening {
    Accepted,
    Excluded(Exclusion),
}

impl Screening {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Screening::Accepted)
    }
}

/// Tally of screening results over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningStats {
    pub total: usize,
    pub accepted: usize,
    pub errored: usize,
    pub skipped: usize,
    pub keyword_mismatch: usize,
    pub no_sponsorship: usize,
    pub level: usize,
    pub requires_phd: usize,
    pub internship: usize,
}

impl ScreeningStats {
    pub fn record(&mut self, screening: Screening) {
        self.total += 1;
        let slot = match screening {
            Screening::Accepted => &mut self.accepted,
            Screening::Excluded(Exclusion::Errored) => &mut self.errored,
            Screening::Excluded(Exclusion::Skipped) => &mut self.skipped,
            Screening::Excluded(Exclusion::KeywordMismatch) => &mut self.keyword_mismatch,
            Screening::Excluded(Exclusion::NoSponsorship) => &mut self.no_sponsorship,
            Screening::Excluded(Exclusion::Level) => &mut self.level,
            Screening::Excluded(Exclusion::RequiresPhd) => &mut self.requires_phd,
            Screening::Excluded(Exclusion::Internship) => &mut self.internship,
        };
        *slot += 1;
    }

    pub fn excluded(&self) -> usize {
        self.total - self.accepted
    }
}

impl<'a> FromIterator<&'a Screening> for ScreeningStats {
    fn from_iter<I: IntoIterator<Item = &'a Screening>>(iter: I) -> Self {
        let mut stats = Self::default();
        for screening in iter {
            stats.record(*screening);
        }
        stats
    }
}
