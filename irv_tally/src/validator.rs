//! Admission checks on the raw ballots.

use std::collections::HashSet;

use log::debug;

use crate::config::*;

/// Weights above this value are rejected.
pub const MAX_BALLOT_WEIGHT: f64 = 1_000_000_000.0;

#[derive(PartialEq, Debug, Clone)]
pub enum Verdict<'a> {
    Accepted(&'a RawBallot),
    Rejected {
        reason: RejectionReason,
        candidate: Option<CandidateId>,
    },
}

/// The partition of a batch of ballots.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ValidationReport<'a> {
    /// The accepted ballots with their position in the batch, in batch order.
    pub accepted: Vec<(usize, &'a RawBallot)>,
    pub rejected: Vec<Rejection>,
}

impl<'a> ValidationReport<'a> {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Checks a single ballot.
///
/// The checks run in a fixed order: empty ranking, then the weight (only
/// when weights are honored), then every ranked candidate in rank order. The
/// first failure decides the reason. A ballot that ranks the same candidate
/// twice is accepted; the repeats are removed by the processor.
pub fn validate_ballot<'a>(
    ballot: &'a RawBallot,
    candidate_ids: &HashSet<CandidateId>,
    rules: &BallotRules,
) -> Verdict<'a> {
    if ballot.ranking.is_empty() {
        return Verdict::Rejected {
            reason: RejectionReason::EmptyRanking,
            candidate: None,
        };
    }
    if rules.weight_mode == WeightMode::Weighted {
        if let Some(reason) = ballot.weight.and_then(check_weight) {
            return Verdict::Rejected {
                reason,
                candidate: None,
            };
        }
    }
    if let Some(unknown) = ballot.ranking.iter().find(|id| !candidate_ids.contains(*id)) {
        return Verdict::Rejected {
            reason: RejectionReason::UnknownCandidate,
            candidate: Some(unknown.clone()),
        };
    }
    Verdict::Accepted(ballot)
}

fn check_weight(weight: f64) -> Option<RejectionReason> {
    if !weight.is_finite() {
        Some(RejectionReason::WeightOutOfRange)
    } else if weight > MAX_BALLOT_WEIGHT {
        Some(RejectionReason::WeightOutOfRange)
    } else if VoteCount::from_weight(weight) == VoteCount::EMPTY {
        // Includes the positive weights below half a unit.
        Some(RejectionReason::NonPositiveWeight)
    } else {
        None
    }
}

/// Splits a batch of ballots into accepted and rejected ones.
///
/// Every rejected ballot is recorded individually, with its position.
pub fn validate_ballots<'a>(
    ballots: &'a [RawBallot],
    candidates: &[Candidate],
    rules: &BallotRules,
) -> ValidationReport<'a> {
    let candidate_ids: HashSet<CandidateId> = candidates.iter().map(|c| c.id.clone()).collect();
    let mut report = ValidationReport::default();
    for (ballot_index, ballot) in ballots.iter().enumerate() {
        match validate_ballot(ballot, &candidate_ids, rules) {
            Verdict::Accepted(b) => report.accepted.push((ballot_index, b)),
            Verdict::Rejected { reason, candidate } => {
                debug!(
                    "validate_ballots: ballot {} rejected: {:?} {:?}",
                    ballot_index, reason, candidate
                );
                report.rejected.push(Rejection {
                    ballot_index,
                    reason,
                    candidate,
                });
            }
        }
    }
    debug!(
        "validate_ballots: accepted: {} rejected: {}",
        report.accepted_count(),
        report.rejected_count()
    );
    report
}
