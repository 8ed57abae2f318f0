//! Turns accepted ballots into ballots ready to be counted.

use std::collections::HashSet;

use log::debug;

use crate::config::*;
use crate::validator::ValidationReport;

/// Removes the repeated candidates of a ranking and applies the ballot rules.
///
/// The first occurrence of a candidate is kept and the later ones dropped, so
/// `[A, B, A, C]` becomes `[A, B, C]`. The order is never changed.
pub fn normalize_ballot(ballot: &RawBallot, rules: &BallotRules) -> NormalizedBallot {
    let mut seen: HashSet<&CandidateId> = HashSet::new();
    let mut ranking: Vec<CandidateId> = Vec::with_capacity(ballot.ranking.len());
    for id in ballot.ranking.iter() {
        if seen.insert(id) {
            ranking.push(id.clone());
        } else {
            debug!("normalize_ballot: dropping repeated ranking of {}", id);
        }
    }
    if let Some(max_rankings) = rules.max_rankings_allowed {
        ranking.truncate(max_rankings.get());
    }
    let weight = match rules.weight_mode {
        WeightMode::Weighted => ballot
            .weight
            .map(VoteCount::from_weight)
            .unwrap_or(VoteCount::ONE),
        WeightMode::Unweighted => VoteCount::ONE,
    };
    NormalizedBallot::new(ranking, weight)
}

/// Normalizes all the accepted ballots of a report, in batch order.
pub fn normalize_ballots(
    report: &ValidationReport<'_>,
    rules: &BallotRules,
) -> Vec<NormalizedBallot> {
    report
        .accepted
        .iter()
        .map(|(_, ballot)| normalize_ballot(ballot, rules))
        .collect()
}
