//! Resolution of ties for the lowest total.

use log::debug;

use crate::config::*;
use crate::engine::RoundTrace;

/// What the tie-break strategies made of a tie.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TieBreakDecision {
    /// The candidates tied for the lowest total, in id order.
    pub tied: Vec<CandidateId>,
    /// The strategy that isolated a single candidate, if any did.
    pub decided_by: Option<TieBreakStrategy>,
    /// The candidates to eliminate: a single one, or all the candidates that
    /// no strategy could separate.
    pub eliminated: Vec<CandidateId>,
}

/// Applies the strategies in order to the tied candidates.
///
/// Each strategy narrows the set left by the previous one, and the search
/// stops as soon as a single candidate remains. `history` holds the rounds
/// completed before `round_number`, oldest first.
pub fn break_tie(
    tied: &[CandidateId],
    history: &[RoundTrace],
    strategies: &[TieBreakStrategy],
    round_number: RoundNumber,
) -> TieBreakDecision {
    let mut tied: Vec<CandidateId> = tied.to_vec();
    tied.sort();
    let mut remaining = tied.clone();
    for strategy in strategies.iter() {
        if remaining.len() <= 1 {
            break;
        }
        remaining = match strategy {
            TieBreakStrategy::PreviousRoundTotals => {
                lowest_in_previous_rounds(&remaining, history)
            }
            TieBreakStrategy::Random { seed } => {
                candidate_permutation_crypto(&remaining, *seed, round_number)
                    .into_iter()
                    .take(1)
                    .collect()
            }
            TieBreakStrategy::LexicographicId => remaining.iter().take(1).cloned().collect(),
        };
        debug!(
            "break_tie: round {} strategy {:?} leaves {:?}",
            round_number, strategy, remaining
        );
        if remaining.len() == 1 {
            return TieBreakDecision {
                tied,
                decided_by: Some(*strategy),
                eliminated: remaining,
            };
        }
    }
    TieBreakDecision {
        tied,
        decided_by: None,
        eliminated: remaining,
    }
}

// Walks back the rounds, keeping the candidates with the lowest total, until
// a single one is left or the history is exhausted.
fn lowest_in_previous_rounds(
    candidates: &[CandidateId],
    history: &[RoundTrace],
) -> Vec<CandidateId> {
    let mut remaining: Vec<CandidateId> = candidates.to_vec();
    for round in history.iter().rev() {
        let total_of = |cid: &CandidateId| {
            round
                .totals
                .get(cid)
                .cloned()
                .unwrap_or(VoteCount::EMPTY)
        };
        let lowest = match remaining.iter().map(total_of).min() {
            Some(vc) => vc,
            None => break,
        };
        remaining.retain(|cid| total_of(cid) == lowest);
        if remaining.len() == 1 {
            break;
        }
    }
    remaining
}

/// The pseudo-random elimination order for a round: candidates sorted by the
/// SHA-256 digest of `"{seed}:{round}:{id}"`, smallest digest first.
pub fn candidate_permutation_crypto(
    candidates: &[CandidateId],
    seed: u64,
    round_number: RoundNumber,
) -> Vec<CandidateId> {
    let mut data: Vec<(String, CandidateId)> = candidates
        .iter()
        .map(|cid| {
            let digest = sha256::digest(format!("{}:{}:{}", seed, round_number, cid));
            (digest, cid.clone())
        })
        .collect();
    data.sort();
    data.into_iter().map(|(_, cid)| cid).collect()
}
