//! Packaging of the rounds into the final result.

use std::collections::BTreeMap;

use crate::config::*;
use crate::engine::{RoundTrace, TallyTrace, Termination};

/// Builds the result of an election from the trace of its rounds and the
/// ballots rejected at validation.
pub fn aggregate(
    trace: &TallyTrace,
    rejections: &[Rejection],
    total_accepted_weight: VoteCount,
) -> TallyResult {
    let (winner, outcome) = match &trace.termination {
        Termination::Winner(cid) => (Some(cid.clone()), Outcome::Winner),
        Termination::NoWinner { .. } => (None, Outcome::NoWinner),
        Termination::Aborted => (None, Outcome::Aborted),
    };
    TallyResult {
        winner,
        outcome,
        rounds: trace.rounds.iter().map(round_trace_to_round).collect(),
        rejected_ballots: count_rejections(rejections),
        total_accepted_weight,
        total_rejected_count: rejections.len() as u64,
        total_exhausted_weight: trace
            .rounds
            .last()
            .map(|r| r.exhausted_weight)
            .unwrap_or(VoteCount::EMPTY),
    }
}

fn round_trace_to_round(rt: &RoundTrace) -> Round {
    Round {
        round_number: rt.round_number,
        totals: rt.totals.clone(),
        exhausted_weight: rt.exhausted_weight,
        eliminated: rt.eliminated.clone(),
    }
}

/// Counts the rejected ballots by reason, in reason order.
pub fn count_rejections(rejections: &[Rejection]) -> Vec<RejectionCount> {
    let mut counts: BTreeMap<RejectionReason, u64> = BTreeMap::new();
    for r in rejections.iter() {
        *counts.entry(r.reason).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(reason, count)| RejectionCount { reason, count })
        .collect()
}
