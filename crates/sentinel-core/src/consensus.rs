//! Consensus over ensemble votes.
//!
//! # Resolution rules (strict)
//!
//! 1. Boolean fields: strict majority. Exactly half is `false`.
//! 2. `job_level`: plurality; ties go to the more junior level.
//! 3. Deterministic rule values overwrite the vote, unconditionally.
//! 4. Justification: the vote closest (Hamming distance over the boolean
//!    fields) to the final consensus; first one wins ties.
//!
//! These rules are not configurable.

use std::collections::BTreeMap;

use crate::rules::{Decision, RuleOutcome};
use crate::types::{BooleanField, ConsensusEvaluation, EvaluationVote, JobLevel, Posting};

/// Reduces surviving ensemble votes into one evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsensusBuilder;

impl ConsensusBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the consensus evaluation.
    ///
    /// Returns `None` when there are no votes: an empty ensemble is never
    /// turned into a default evaluation.
    pub fn build(
        &self,
        votes: &[EvaluationVote],
        rules: &RuleOutcome,
        posting: &Posting,
    ) -> Option<ConsensusEvaluation> {
        if votes.is_empty() {
            return None;
        }

        let mut evaluation = ConsensusEvaluation {
            keyword_match: majority(votes, BooleanField::KeywordMatch),
            visa_sponsorship: majority(votes, BooleanField::VisaSponsorship),
            job_level: plurality_level(votes),
            requires_phd: majority(votes, BooleanField::RequiresPhd),
            is_internship: majority(votes, BooleanField::IsInternship),
            reason: String::new(),
            job_title: posting.title.clone(),
            company: posting.company.clone(),
            votes: votes.len(),
            rate_limited: false,
        };

        apply_overrides(&mut evaluation, rules);

        evaluation.reason = closest_vote(votes, &evaluation)
            .map(|v| v.reason.clone())
            .unwrap_or_default();

        Some(evaluation)
    }
}

/// `true` iff strictly more than half of the votes are `true`.
pub fn majority(votes: &[EvaluationVote], field: BooleanField) -> bool {
    let yes = votes.iter().filter(|v| v.flag(field)).count();
    yes * 2 > votes.len()
}

/// Most frequent level; ties resolve to the lowest rank.
///
/// An empty slice yields the most junior level.
pub fn plurality_level(votes: &[EvaluationVote]) -> JobLevel {
    let mut counts: BTreeMap<JobLevel, usize> = BTreeMap::new();
    for vote in votes {
        *counts.entry(vote.job_level).or_default() += 1;
    }

    // BTreeMap iterates junior-first, so keeping only strictly larger counts
    // leaves the most junior level among the tied maxima.
    let mut best = (JobLevel::Internship, 0usize);
    for (level, count) in counts {
        if count > best.1 {
            best = (level, count);
        }
    }
    best.0
}

/// Overwrite every field the rule engine decided.
pub fn apply_overrides(evaluation: &mut ConsensusEvaluation, rules: &RuleOutcome) {
    for field in BooleanField::ALL {
        if let Decision::Decided(value) = rules.flag(field) {
            if evaluation.flag(field) != value {
                tracing::debug!(
                    field = field.name(),
                    voted = evaluation.flag(field),
                    decided = value,
                    "Deterministic override"
                );
            }
            evaluation.set_flag(field, value);
        }
    }

    if let Decision::Decided(level) = rules.job_level {
        if evaluation.job_level != level {
            tracing::debug!(
                field = "job_level",
                voted = %evaluation.job_level,
                decided = %level,
                "Deterministic override"
            );
        }
        evaluation.job_level = level;
    }
}

/// Number of boolean fields on which a vote disagrees with the consensus.
pub fn hamming_distance(vote: &EvaluationVote, evaluation: &ConsensusEvaluation) -> usize {
    BooleanField::ALL
        .iter()
        .filter(|f| vote.flag(**f) != evaluation.flag(**f))
        .count()
}

/// The first vote with the smallest Hamming distance to the consensus.
pub fn closest_vote<'a>(
    votes: &'a [EvaluationVote],
    evaluation: &ConsensusEvaluation,
) -> Option<&'a EvaluationVote> {
    // min_by_key keeps the first of equal minima
    votes.iter().min_by_key(|v| hamming_distance(v, evaluation))
}

/// Convenience wrapper around [`ConsensusBuilder::build`].
pub fn reach_consensus(
    votes: &[EvaluationVote],
    rules: &RuleOutcome,
    posting: &Posting,
) -> Option<ConsensusEvaluation> {
    ConsensusBuilder::new().build(votes, rules, posting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vote(keyword: bool, visa: bool, level: JobLevel, reason: &str) -> EvaluationVote {
        EvaluationVote {
            keyword_match: keyword,
            visa_sponsorship: visa,
            job_level: level,
            requires_phd: false,
            is_internship: false,
            reason: reason.to_string(),
        }
    }

    fn undecided() -> RuleOutcome {
        RuleOutcome {
            keyword_match: Decision::Undecided,
            visa_sponsorship: Decision::Undecided,
            is_internship: Decision::Undecided,
            requires_phd: Decision::Undecided,
            job_level: Decision::Undecided,
        }
    }

    fn posting() -> Posting {
        Posting::new("Software Engineer", "Acme", "A long enough description")
    }

    #[test]
    fn test_empty_votes_yield_none() {
        assert!(reach_consensus(&[], &undecided(), &posting()).is_none());
    }

    #[test]
    fn test_majority_two_of_three() {
        let votes = vec![
            vote(true, true, JobLevel::Entry, "a"),
            vote(true, false, JobLevel::Entry, "b"),
            vote(false, false, JobLevel::Entry, "c"),
        ];
        let eval = reach_consensus(&votes, &undecided(), &posting()).unwrap();
        assert!(eval.keyword_match);
        assert!(!eval.visa_sponsorship);
        assert_eq!(eval.votes, 3);
        assert_eq!(eval.job_title, "Software Engineer");
    }

    #[test]
    fn test_exactly_half_is_false() {
        let votes = vec![
            vote(true, true, JobLevel::Entry, "a"),
            vote(false, false, JobLevel::Entry, "b"),
        ];
        assert!(!majority(&votes, BooleanField::KeywordMatch));
        assert!(!majority(&votes, BooleanField::VisaSponsorship));
    }

    #[test]
    fn test_level_tie_goes_junior() {
        let votes = vec![
            vote(true, true, JobLevel::Mid, "a"),
            vote(true, true, JobLevel::Junior, "b"),
        ];
        assert_eq!(plurality_level(&votes), JobLevel::Junior);

        let votes = vec![
            vote(true, true, JobLevel::Senior, "a"),
            vote(true, true, JobLevel::Entry, "b"),
            vote(true, true, JobLevel::Senior, "c"),
        ];
        assert_eq!(plurality_level(&votes), JobLevel::Senior);
    }

    #[test]
    fn test_overrides_beat_unanimous_votes() {
        let votes = vec![
            vote(true, true, JobLevel::Entry, "a"),
            vote(true, true, JobLevel::Entry, "b"),
            vote(true, true, JobLevel::Entry, "c"),
        ];
        let mut rules = undecided();
        rules.visa_sponsorship = Decision::Decided(false);
        rules.requires_phd = Decision::Decided(true);
        rules.job_level = Decision::Decided(JobLevel::Senior);

        let eval = reach_consensus(&votes, &rules, &posting()).unwrap();
        assert!(!eval.visa_sponsorship);
        assert!(eval.requires_phd);
        assert_eq!(eval.job_level, JobLevel::Senior);
        assert!(eval.keyword_match);
    }

    #[test]
    fn test_reason_from_closest_vote() {
        let votes = vec![
            vote(false, false, JobLevel::Entry, "far"),
            vote(true, true, JobLevel::Entry, "close"),
            vote(true, true, JobLevel::Entry, "also close"),
        ];
        let eval = reach_consensus(&votes, &undecided(), &posting()).unwrap();
        assert_eq!(eval.reason, "close");
    }

    #[test]
    fn test_reason_measured_after_overrides() {
        let votes = vec![
            vote(true, true, JobLevel::Entry, "majority"),
            vote(true, true, JobLevel::Entry, "majority too"),
            vote(true, false, JobLevel::Entry, "agrees with rules"),
        ];
        let mut rules = undecided();
        rules.visa_sponsorship = Decision::Decided(false);

        let eval = reach_consensus(&votes, &rules, &posting()).unwrap();
        assert_eq!(eval.reason, "agrees with rules");
    }

    fn arb_level() -> impl Strategy<Value = JobLevel> {
        prop_oneof![
            Just(JobLevel::Internship),
            Just(JobLevel::Entry),
            Just(JobLevel::Junior),
            Just(JobLevel::Mid),
            Just(JobLevel::Senior),
        ]
    }

    fn arb_vote() -> impl Strategy<Value = EvaluationVote> {
        (any::<bool>(), any::<bool>(), arb_level(), any::<bool>(), any::<bool>()).prop_map(
            |(keyword_match, visa_sponsorship, job_level, requires_phd, is_internship)| {
                EvaluationVote {
                    keyword_match,
                    visa_sponsorship,
                    job_level,
                    requires_phd,
                    is_internship,
                    reason: String::new(),
                }
            },
        )
    }

    proptest! {
        #[test]
        fn prop_majority_is_strict(votes in proptest::collection::vec(arb_vote(), 1..9)) {
            let yes = votes.iter().filter(|v| v.keyword_match).count();
            prop_assert_eq!(majority(&votes, BooleanField::KeywordMatch), yes * 2 > votes.len());
        }

        #[test]
        fn prop_decided_fields_always_win(
            votes in proptest::collection::vec(arb_vote(), 1..7),
            visa in any::<bool>(),
            phd in any::<bool>(),
            level in arb_level(),
        ) {
            let mut rules = undecided();
            rules.visa_sponsorship = Decision::Decided(visa);
            rules.requires_phd = Decision::Decided(phd);
            rules.job_level = Decision::Decided(level);

            let eval = reach_consensus(&votes, &rules, &posting()).unwrap();
            prop_assert_eq!(eval.visa_sponsorship, visa);
            prop_assert_eq!(eval.requires_phd, phd);
            prop_assert_eq!(eval.job_level, level);
        }

        #[test]
        fn prop_plurality_is_a_maximum(votes in proptest::collection::vec(arb_vote(), 1..9)) {
            let chosen = plurality_level(&votes);
            let count = |l: JobLevel| votes.iter().filter(|v| v.job_level == l).count();
            for level in JobLevel::ALL {
                prop_assert!(count(chosen) >= count(level));
                if count(level) == count(chosen) {
                    prop_assert!(chosen <= level);
                }
            }
        }
    }
}
