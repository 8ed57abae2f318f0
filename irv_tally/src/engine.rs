//! The instant-runoff rounds.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::thread;

use log::{debug, info};
use snafu::ensure;

use crate::config::*;
use crate::tiebreak::{break_tie, TieBreakDecision};

// Position of a candidate in the registered candidate list.
type Slot = usize;

// Below this many ballots per worker, the scan stays on the calling thread.
const MIN_BALLOTS_PER_WORKER: usize = 1024;

/// Everything the engine knows about one round.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RoundTrace {
    pub round_number: RoundNumber,
    /// The totals of the candidates active in this round.
    pub totals: BTreeMap<CandidateId, VoteCount>,
    /// Cumulative weight of the ballots with no active candidate left.
    pub exhausted_weight: VoteCount,
    pub continuing_weight: VoteCount,
    pub threshold: VoteCount,
    pub eliminated: Vec<CandidateId>,
    /// The status of every candidate at the end of the round.
    pub statuses: BTreeMap<CandidateId, CandidateStatus>,
    pub tiebreak: Option<TieBreakDecision>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Termination {
    Winner(CandidateId),
    /// All the remaining candidates were tied and could not be separated.
    NoWinner { tied: Vec<CandidateId> },
    Aborted,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyTrace {
    pub rounds: Vec<RoundTrace>,
    pub termination: Termination,
    pub total_weight: VoteCount,
}

struct BallotInternal {
    ranks: Vec<Slot>,
    weight: VoteCount,
}

// The result of scanning the ballots once.
#[derive(Debug, Clone)]
struct RoundScan {
    totals: Vec<VoteCount>,
    exhausted: VoteCount,
}

impl RoundScan {
    fn empty(num_candidates: usize) -> RoundScan {
        RoundScan {
            totals: vec![VoteCount::EMPTY; num_candidates],
            exhausted: VoteCount::EMPTY,
        }
    }

    fn merge(mut self, other: RoundScan) -> RoundScan {
        for (vc, other_vc) in self.totals.iter_mut().zip(other.totals) {
            *vc += other_vc;
        }
        self.exhausted += other.exhausted;
        self
    }
}

/// Runs the rounds of an instant-runoff election on normalized ballots.
///
/// Fails before the first round if the candidate set is empty or has
/// duplicates, if there are no ballots, or if a ballot names an unknown
/// candidate or the same candidate twice.
pub fn count_rounds(
    candidates: &[Candidate],
    ballots: &[NormalizedBallot],
    config: &TallyConfig,
) -> Result<TallyTrace, TallyError> {
    count_rounds_until(candidates, ballots, config, |_| config.interrupted())
}

// `interrupted` is asked before each round, with the number of that round.
pub(crate) fn count_rounds_until<F>(
    candidates: &[Candidate],
    ballots: &[NormalizedBallot],
    config: &TallyConfig,
    interrupted: F,
) -> Result<TallyTrace, TallyError>
where
    F: Fn(RoundNumber) -> bool,
{
    info!(
        "Processing {:?} ballots, {:?} candidates, config: {:?}",
        ballots.len(),
        candidates.len(),
        config
    );
    ensure!(!candidates.is_empty(), EmptyCandidateSetSnafu {});
    let mut slots: HashMap<&CandidateId, Slot> = HashMap::new();
    for (slot, c) in candidates.iter().enumerate() {
        ensure!(
            slots.insert(&c.id, slot).is_none(),
            DuplicateCandidateSnafu { id: c.id.clone() }
        );
    }
    ensure!(!ballots.is_empty(), NoBallotsSnafu {});

    let internal = index_ballots(ballots, &slots)?;
    let total_weight = match internal
        .iter()
        .try_fold(VoteCount::EMPTY, |acc, b| acc.checked_add(b.weight))
    {
        Some(w) => w,
        None => return WeightOverflowSnafu {}.fail(),
    };
    let ids: Vec<&CandidateId> = candidates.iter().map(|c| &c.id).collect();
    let mut statuses: Vec<CandidateStatus> = vec![CandidateStatus::Active; candidates.len()];
    let mut rounds: Vec<RoundTrace> = Vec::new();

    loop {
        let round_number = rounds.len() as RoundNumber + 1;
        if interrupted(round_number) {
            info!("Tally interrupted before round {}", round_number);
            return Ok(TallyTrace {
                rounds,
                termination: Termination::Aborted,
                total_weight,
            });
        }

        let active: Vec<Slot> = (0..candidates.len())
            .filter(|&s| statuses[s].is_active())
            .collect();
        let scan = scan_ballots(&internal, &statuses, config.parallelism);
        let continuing_weight: VoteCount = active.iter().map(|&s| scan.totals[s]).sum();
        let threshold = match config.majority_rule {
            MajorityRule::ContinuingBallots => continuing_weight.majority(),
            MajorityRule::TotalValidBallots => total_weight.majority(),
        };
        info!("Round {} (winning threshold: {})", round_number, threshold);
        for &s in active.iter() {
            info!("    {} {}", scan.totals[s], ids[s]);
        }
        debug!("count_rounds: exhausted: {}", scan.exhausted);

        let mut round = RoundTrace {
            round_number,
            totals: active
                .iter()
                .map(|&s| (ids[s].clone(), scan.totals[s]))
                .collect(),
            exhausted_weight: scan.exhausted,
            continuing_weight,
            threshold,
            eliminated: vec![],
            statuses: BTreeMap::new(),
            tiebreak: None,
        };

        let termination = if active.len() == 1 {
            Some(Termination::Winner(ids[active[0]].clone()))
        } else if let Some(leader) = find_majority(&active, &scan.totals, threshold) {
            Some(Termination::Winner(ids[leader].clone()))
        } else {
            let tally: Vec<(Slot, VoteCount)> =
                active.iter().map(|&s| (s, scan.totals[s])).collect();
            match find_eliminated_candidates(&tally, &ids, &rounds, config, round_number) {
                Elimination::Candidates(eliminated, decision) => {
                    for &s in eliminated.iter() {
                        info!("    eliminated {}", ids[s]);
                        statuses[s] = CandidateStatus::Eliminated(round_number);
                    }
                    round.eliminated = eliminated.iter().map(|&s| ids[s].clone()).collect();
                    round.eliminated.sort();
                    round.tiebreak = decision;
                    None
                }
                Elimination::Stalemate(decision) => {
                    info!("    no winner: {:?} cannot be separated", decision.tied);
                    let tied = decision.tied.clone();
                    round.tiebreak = Some(decision);
                    Some(Termination::NoWinner { tied })
                }
            }
        };

        round.statuses = ids
            .iter()
            .zip(statuses.iter())
            .map(|(cid, st)| ((*cid).clone(), *st))
            .collect();
        rounds.push(round);

        if let Some(termination) = termination {
            if let Termination::Winner(cid) = &termination {
                info!("Winner: {} after {} round(s)", cid, rounds.len());
            }
            return Ok(TallyTrace {
                rounds,
                termination,
                total_weight,
            });
        }
    }
}

fn index_ballots(
    ballots: &[NormalizedBallot],
    slots: &HashMap<&CandidateId, Slot>,
) -> Result<Vec<BallotInternal>, TallyError> {
    let mut res: Vec<BallotInternal> = Vec::with_capacity(ballots.len());
    for ballot in ballots.iter() {
        let mut seen: HashSet<Slot> = HashSet::new();
        let mut ranks: Vec<Slot> = Vec::with_capacity(ballot.ranking().len());
        for cid in ballot.ranking().iter() {
            let slot = match slots.get(cid) {
                Some(&slot) => slot,
                None => return UnknownBallotCandidateSnafu { id: cid.clone() }.fail(),
            };
            ensure!(seen.insert(slot), DuplicateBallotCandidateSnafu { id: cid.clone() });
            ranks.push(slot);
        }
        res.push(BallotInternal {
            ranks,
            weight: ballot.weight(),
        });
    }
    Ok(res)
}

fn scan_chunk(ballots: &[BallotInternal], statuses: &[CandidateStatus]) -> RoundScan {
    let mut scan = RoundScan::empty(statuses.len());
    for ballot in ballots.iter() {
        match ballot.ranks.iter().find(|&&s| statuses[s].is_active()) {
            Some(&s) => scan.totals[s] += ballot.weight,
            None => scan.exhausted += ballot.weight,
        }
    }
    scan
}

// Sums the first active preference of every ballot. With several workers, the
// ballots are cut in contiguous chunks and the partial sums are merged in
// chunk order, so the result does not depend on the number of workers.
fn scan_ballots(
    ballots: &[BallotInternal],
    statuses: &[CandidateStatus],
    parallelism: Parallelism,
) -> RoundScan {
    let workers = match parallelism {
        Parallelism::Sequential => 1,
        Parallelism::Threads(n) => n
            .get()
            .min(ballots.len() / MIN_BALLOTS_PER_WORKER)
            .max(1),
    };
    if workers == 1 {
        return scan_chunk(ballots, statuses);
    }
    let chunk_size = (ballots.len() + workers - 1) / workers;
    debug!(
        "scan_ballots: {} workers, chunks of {} ballots",
        workers, chunk_size
    );
    let partials: Vec<RoundScan> = thread::scope(|scope| {
        let handles: Vec<_> = ballots
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || scan_chunk(chunk, statuses)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });
    partials
        .into_iter()
        .fold(RoundScan::empty(statuses.len()), RoundScan::merge)
}

fn find_majority(active: &[Slot], totals: &[VoteCount], threshold: VoteCount) -> Option<Slot> {
    active
        .iter()
        .cloned()
        .filter(|&s| totals[s] >= threshold)
        .max_by_key(|&s| totals[s])
}

enum Elimination {
    Candidates(Vec<Slot>, Option<TieBreakDecision>),
    Stalemate(TieBreakDecision),
}

fn find_eliminated_candidates(
    tally: &[(Slot, VoteCount)],
    ids: &[&CandidateId],
    history: &[RoundTrace],
    config: &TallyConfig,
    round_number: RoundNumber,
) -> Elimination {
    if config.elimination_algorithm == EliminationAlgorithm::Batch {
        if let Some(batch) = find_eliminated_candidates_batch(tally, ids) {
            return Elimination::Candidates(batch, None);
        }
    }
    find_eliminated_candidates_single(tally, ids, history, config, round_number)
}

fn find_eliminated_candidates_batch(
    tally: &[(Slot, VoteCount)],
    ids: &[&CandidateId],
) -> Option<Vec<Slot>> {
    // Increasing tally, ties by id.
    let mut sorted_tally: Vec<(Slot, VoteCount)> = tally.to_vec();
    sorted_tally.sort_by(|(s1, vc1), (s2, vc2)| {
        vc1.cmp(vc2).then_with(|| ids[*s1].cmp(ids[*s2]))
    });

    // The last position where the sum of all the lower counts is still
    // strictly below the count at this position. The candidates before it
    // cannot overtake anyone from there, even pooling all their votes.
    let mut cumulative = VoteCount::EMPTY;
    let mut large_gap_idx: Option<usize> = None;
    for (idx, (_, vc)) in sorted_tally.iter().enumerate() {
        if cumulative < *vc {
            large_gap_idx = Some(idx);
        }
        cumulative += *vc;
    }
    debug!(
        "find_eliminated_candidates_batch: sorted_tally: {:?} gap: {:?}",
        sorted_tally, large_gap_idx
    );

    // idx == 0 is not relevant: nothing is below the first candidate.
    match large_gap_idx {
        Some(idx) if idx > 0 => {
            let res: Vec<Slot> = sorted_tally.iter().take(idx).map(|(s, _)| *s).collect();
            debug!(
                "find_eliminated_candidates_batch: found a batch to eliminate: {:?}",
                res
            );
            Some(res)
        }
        _ => {
            debug!("find_eliminated_candidates_batch: no candidates to eliminate");
            None
        }
    }
}

fn find_eliminated_candidates_single(
    tally: &[(Slot, VoteCount)],
    ids: &[&CandidateId],
    history: &[RoundTrace],
    config: &TallyConfig,
    round_number: RoundNumber,
) -> Elimination {
    let min_count = match tally.iter().map(|(_, vc)| *vc).min() {
        Some(vc) => vc,
        None => {
            return Elimination::Candidates(vec![], None);
        }
    };
    let lowest: Vec<Slot> = tally
        .iter()
        .filter(|(_, vc)| *vc == min_count)
        .map(|(s, _)| *s)
        .collect();
    if lowest.len() == 1 {
        debug!(
            "find_eliminated_candidates_single: lowest candidate: {}",
            ids[lowest[0]]
        );
        return Elimination::Candidates(lowest, None);
    }

    let tied: Vec<CandidateId> = lowest.iter().map(|&s| ids[s].clone()).collect();
    let decision = break_tie(&tied, history, &config.tiebreak, round_number);
    debug!("find_eliminated_candidates_single: tiebreak: {:?}", decision);
    if decision.eliminated.len() == tally.len() {
        return Elimination::Stalemate(decision);
    }
    let eliminated: Vec<Slot> = lowest
        .into_iter()
        .filter(|&s| decision.eliminated.contains(ids[s]))
        .collect();
    Elimination::Candidates(eliminated, Some(decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    fn candidates(names: &[&str]) -> Vec<Candidate> {
        names.iter().map(|n| Candidate::new(*n, *n)).collect()
    }

    fn ballot(ranking: &[&str], votes: u64) -> NormalizedBallot {
        NormalizedBallot::new(
            ranking.iter().map(|s| CandidateId::from(*s)).collect(),
            VoteCount::from_votes(votes),
        )
    }

    fn cid(s: &str) -> CandidateId {
        CandidateId::from(s)
    }

    #[test]
    fn preconditions() {
        let config = TallyConfig::default();
        let ballots = vec![ballot(&["A"], 1)];
        assert!(matches!(
            count_rounds(&[], &ballots, &config),
            Err(TallyError::EmptyCandidateSet {})
        ));
        assert!(matches!(
            count_rounds(&candidates(&["A", "B", "A"]), &ballots, &config),
            Err(TallyError::DuplicateCandidate { .. })
        ));
        assert!(matches!(
            count_rounds(&candidates(&["A"]), &[], &config),
            Err(TallyError::NoBallots {})
        ));
        assert!(matches!(
            count_rounds(&candidates(&["A"]), &[ballot(&["A", "X"], 1)], &config),
            Err(TallyError::UnknownBallotCandidate { .. })
        ));
        assert!(matches!(
            count_rounds(&candidates(&["A", "B"]), &[ballot(&["A", "B", "A"], 1)], &config),
            Err(TallyError::DuplicateBallotCandidate { .. })
        ));
    }

    #[test]
    fn exhausted_weight_accumulates() {
        let ballots = vec![
            ballot(&["A"], 4),
            ballot(&["B", "A"], 3),
            ballot(&["C"], 2),
        ];
        let trace =
            count_rounds(&candidates(&["A", "B", "C"]), &ballots, &TallyConfig::default()).unwrap();
        assert_eq!(trace.rounds.len(), 2);
        let r1 = &trace.rounds[0];
        assert_eq!(r1.eliminated, vec![cid("C")]);
        assert_eq!(r1.exhausted_weight, VoteCount::EMPTY);
        let r2 = &trace.rounds[1];
        assert_eq!(r2.exhausted_weight, VoteCount::from_votes(2));
        assert_eq!(r2.continuing_weight, VoteCount::from_votes(7));
        assert_eq!(r2.threshold, VoteCount::from_votes(7).majority());
        assert_eq!(trace.termination, Termination::Winner(cid("A")));
        assert_eq!(r2.statuses[&cid("C")], CandidateStatus::Eliminated(1));
        assert_eq!(r2.statuses[&cid("A")], CandidateStatus::Active);
    }

    #[test]
    fn total_valid_ballots_threshold_is_fixed() {
        let ballots = vec![
            ballot(&["A"], 4),
            ballot(&["B"], 3),
            ballot(&["C"], 2),
        ];
        let config = TallyConfig {
            majority_rule: MajorityRule::TotalValidBallots,
            ..TallyConfig::default()
        };
        let trace = count_rounds(&candidates(&["A", "B", "C"]), &ballots, &config).unwrap();
        // A only keeps 4 of 9 votes, B is eliminated, then A is the last one.
        assert_eq!(trace.rounds.len(), 3);
        for r in trace.rounds.iter() {
            assert_eq!(r.threshold, VoteCount::from_votes(9).majority());
        }
        assert_eq!(trace.termination, Termination::Winner(cid("A")));
    }

    #[test]
    fn batch_eliminates_hopeless_candidates_together() {
        let ballots = vec![
            ballot(&["A"], 10),
            ballot(&["B"], 8),
            ballot(&["C"], 3),
            ballot(&["D"], 2),
        ];
        let config = TallyConfig {
            elimination_algorithm: EliminationAlgorithm::Batch,
            ..TallyConfig::default()
        };
        let trace = count_rounds(&candidates(&["A", "B", "C", "D"]), &ballots, &config).unwrap();
        assert_eq!(trace.rounds[0].eliminated, vec![cid("C"), cid("D")]);
        assert_eq!(trace.rounds.len(), 2);
        assert_eq!(trace.termination, Termination::Winner(cid("A")));
    }

    #[test]
    fn batch_falls_back_to_single() {
        let tally = vec![
            (0, VoteCount::from_votes(2)),
            (1, VoteCount::from_votes(2)),
            (2, VoteCount::from_votes(3)),
        ];
        let (a, b, c) = (cid("A"), cid("B"), cid("C"));
        let ids = vec![&a, &b, &c];
        assert_eq!(find_eliminated_candidates_batch(&tally, &ids), None);
    }

    #[test]
    fn partial_unresolved_tie_eliminates_all_tied() {
        let ballots = vec![
            ballot(&["A"], 5),
            ballot(&["B"], 1),
            ballot(&["C"], 1),
        ];
        let config = TallyConfig {
            tiebreak: vec![],
            ..TallyConfig::default()
        };
        let trace = count_rounds(&candidates(&["A", "B", "C"]), &ballots, &config).unwrap();
        // A already has a majority.
        assert_eq!(trace.rounds.len(), 1);

        let ballots = vec![
            ballot(&["A"], 3),
            ballot(&["B"], 1),
            ballot(&["C"], 1),
            ballot(&["D"], 2),
        ];
        let trace = count_rounds(&candidates(&["A", "B", "C", "D"]), &ballots, &config).unwrap();
        assert_eq!(trace.rounds[0].eliminated, vec![cid("B"), cid("C")]);
        assert!(trace.rounds[0].tiebreak.is_some());
    }

    #[test]
    fn full_tie_is_no_winner() {
        let ballots = vec![ballot(&["A"], 1), ballot(&["B"], 1)];
        let config = TallyConfig {
            tiebreak: vec![TieBreakStrategy::PreviousRoundTotals],
            ..TallyConfig::default()
        };
        let trace = count_rounds(&candidates(&["A", "B"]), &ballots, &config).unwrap();
        assert_eq!(trace.rounds.len(), 1);
        assert!(trace.rounds[0].eliminated.is_empty());
        assert_eq!(
            trace.termination,
            Termination::NoWinner {
                tied: vec![cid("A"), cid("B")]
            }
        );
    }

    #[test]
    fn threaded_scan_matches_sequential() {
        let names = ["A", "B", "C", "D"];
        let ballots: Vec<NormalizedBallot> = (0..5_000u64)
            .map(|i| {
                let first = names[(i % 4) as usize];
                let second = names[((i * 7 + 1) % 4) as usize];
                if first == second {
                    ballot(&[first], 1 + i % 3)
                } else {
                    ballot(&[first, second], 1 + i % 3)
                }
            })
            .collect();
        let sequential =
            count_rounds(&candidates(&names), &ballots, &TallyConfig::default()).unwrap();
        let threaded = count_rounds(
            &candidates(&names),
            &ballots,
            &TallyConfig {
                parallelism: Parallelism::Threads(NonZeroUsize::new(4).unwrap()),
                ..TallyConfig::default()
            },
        )
        .unwrap();
        assert_eq!(sequential, threaded);
    }

    #[test]
    fn cancelled_before_first_round() {
        let token = CancellationToken::new();
        token.cancel();
        let config = TallyConfig {
            cancellation: Some(token),
            ..TallyConfig::default()
        };
        let trace = count_rounds(&candidates(&["A", "B"]), &[ballot(&["A"], 1)], &config).unwrap();
        assert!(trace.rounds.is_empty());
        assert_eq!(trace.termination, Termination::Aborted);
    }

    #[test]
    fn interrupted_between_rounds_keeps_completed_rounds() {
        let ballots = vec![
            ballot(&["A"], 4),
            ballot(&["B", "A"], 3),
            ballot(&["C"], 2),
        ];
        let names = candidates(&["A", "B", "C"]);
        let config = TallyConfig::default();
        let trace = count_rounds_until(&names, &ballots, &config, |round| round > 1).unwrap();
        assert_eq!(trace.termination, Termination::Aborted);
        assert_eq!(trace.rounds.len(), 1);
        assert_eq!(trace.rounds[0].eliminated, vec![cid("C")]);
        assert_eq!(trace.total_weight, VoteCount::from_votes(9));

        // The completed round is the same as in an uninterrupted tally.
        let full = count_rounds(&names, &ballots, &config).unwrap();
        assert_eq!(trace.rounds[0], full.rounds[0]);
    }

    #[test]
    fn overflowing_total_weight_is_an_error() {
        let huge = VoteCount::from_units(u64::MAX / 2 + 1);
        let ballots = vec![
            NormalizedBallot::new(vec![cid("A")], huge),
            NormalizedBallot::new(vec![cid("B")], huge),
        ];
        let res = count_rounds(&candidates(&["A", "B"]), &ballots, &TallyConfig::default());
        assert!(matches!(res, Err(TallyError::WeightOverflow {})));
    }
}
