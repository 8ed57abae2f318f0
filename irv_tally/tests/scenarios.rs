use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use irv_tally::processor::normalize_ballot;
use irv_tally::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn candidates(ids: &[&str]) -> Vec<Candidate> {
    ids.iter().map(|id| Candidate::new(*id, *id)).collect()
}

fn ballots(rankings: &[&[&str]]) -> Vec<RawBallot> {
    rankings.iter().map(|r| RawBallot::new(r.iter().cloned())).collect()
}

fn totals(pairs: &[(&str, u64)]) -> BTreeMap<CandidateId, VoteCount> {
    pairs
        .iter()
        .map(|(id, v)| (CandidateId::from(*id), VoteCount::from_votes(*v)))
        .collect()
}

fn cid(id: &str) -> CandidateId {
    CandidateId::from(id)
}

fn run(cands: &[&str], rankings: &[&[&str]], config: &TallyConfig) -> TallyResult {
    init();
    run_election(
        &candidates(cands),
        &ballots(rankings),
        &BallotRules::DEFAULT_RULES,
        config,
    )
    .unwrap()
}

#[test]
fn first_round_majority() {
    let res = run(
        &["A", "B", "C"],
        &[&["A", "B"], &["A", "C"], &["B", "A"], &["C", "A"], &["A", "B"]],
        &TallyConfig::default(),
    );
    assert_eq!(res.outcome, Outcome::Winner);
    assert_eq!(res.winner, Some(cid("A")));
    assert_eq!(res.rounds.len(), 1);
    assert_eq!(res.rounds[0].totals, totals(&[("A", 3), ("B", 1), ("C", 1)]));
    assert!(res.rounds[0].eliminated.is_empty());
    assert_eq!(res.total_accepted_weight, VoteCount::from_votes(5));
}

#[test]
fn elimination_then_win() {
    let res = run(
        &["A", "B", "C"],
        &[&["A"], &["B"], &["C"], &["A", "B"], &["B", "C"]],
        &TallyConfig::default(),
    );
    let r1 = &res.rounds[0];
    assert_eq!(r1.totals, totals(&[("A", 2), ("B", 2), ("C", 1)]));
    assert_eq!(r1.eliminated, vec![cid("C")]);

    // The ballot ranking only C is exhausted. A and B are tied in this round
    // and in the previous one: A goes out on its id.
    let r2 = &res.rounds[1];
    assert_eq!(r2.totals, totals(&[("A", 2), ("B", 2)]));
    assert_eq!(r2.exhausted_weight, VoteCount::from_votes(1));
    assert_eq!(r2.eliminated, vec![cid("A")]);

    let r3 = &res.rounds[2];
    assert_eq!(r3.totals, totals(&[("B", 3)]));
    assert_eq!(r3.exhausted_weight, VoteCount::from_votes(2));
    assert_eq!(res.winner, Some(cid("B")));
    assert_eq!(res.total_exhausted_weight, VoteCount::from_votes(2));
}

#[test]
fn transfer_reaches_majority() {
    let res = run(
        &["A", "B", "C"],
        &[&["A"], &["B"], &["C", "B"], &["A", "B"], &["B", "C"]],
        &TallyConfig::default(),
    );
    assert_eq!(res.rounds.len(), 2);
    assert_eq!(res.rounds[1].totals, totals(&[("A", 2), ("B", 3)]));
    assert_eq!(res.rounds[1].continuing_weight(), VoteCount::from_votes(5));
    assert_eq!(res.winner, Some(cid("B")));
}

#[test]
fn lexicographic_tie_break() {
    // B and C are tied in round 1 and have no history.
    let config = TallyConfig {
        tiebreak: vec![TieBreakStrategy::PreviousRoundTotals, TieBreakStrategy::LexicographicId],
        ..TallyConfig::default()
    };
    let res = run(
        &["A", "C", "B"],
        &[&["A"], &["A"], &["C", "A"], &["B", "C"], &["D"]],
        &config,
    );
    assert_eq!(res.rounds[0].eliminated, vec![cid("B")]);
    assert_eq!(res.total_rejected_count, 1);
}

#[test]
fn seeded_random_tie_break_is_reproducible() {
    let config = TallyConfig {
        tiebreak: vec![TieBreakStrategy::Random { seed: 7 }],
        ..TallyConfig::default()
    };
    let rankings: &[&[&str]] = &[&["A"], &["B"], &["C"], &["D"], &["A", "B"]];
    let first = run(&["A", "B", "C", "D"], rankings, &config);
    let second = run(&["A", "B", "C", "D"], rankings, &config);
    assert_eq!(first, second);
    assert_eq!(first.rounds[0].eliminated.len(), 1);
    assert_ne!(first.rounds[0].eliminated[0], cid("A"));
}

#[test]
fn empty_ranking_is_rejected() {
    let res = run(
        &["A", "B"],
        &[&["A"], &[], &["B"], &["A", "B"]],
        &TallyConfig::default(),
    );
    assert_eq!(res.total_rejected_count, 1);
    assert_eq!(
        res.rejected_ballots,
        vec![RejectionCount {
            reason: RejectionReason::EmptyRanking,
            count: 1
        }]
    );
    assert_eq!(res.total_accepted_weight, VoteCount::from_votes(3));
    assert_eq!(res.winner, Some(cid("A")));
}

#[test]
fn repeated_rankings_are_dropped() {
    let b = normalize_ballot(&RawBallot::new(["A", "B", "A"]), &BallotRules::DEFAULT_RULES);
    assert_eq!(b.ranking(), &[cid("A"), cid("B")]);
}

#[test]
fn exhausted_tie_resolved_by_id() {
    let res = run(&["A", "B", "C"], &[&["A"], &["B"], &["C"]], &TallyConfig::default());
    assert_eq!(res.outcome, Outcome::Winner);
    assert_eq!(res.rounds[0].eliminated, vec![cid("A")]);
    assert_eq!(res.rounds[1].eliminated, vec![cid("B")]);
    assert_eq!(res.winner, Some(cid("C")));
    assert_eq!(res.rounds[2].exhausted_weight, VoteCount::from_votes(2));
}

#[test]
fn no_winner_requires_disabled_tie_breaks() {
    let config = TallyConfig {
        tiebreak: vec![],
        ..TallyConfig::default()
    };
    let res = run(&["A", "B"], &[&["A"], &["B"]], &config);
    assert_eq!(res.outcome, Outcome::NoWinner);
    assert_eq!(res.winner, None);
    assert_eq!(res.rounds.len(), 1);
    assert!(res.rounds[0].eliminated.is_empty());
}

#[test]
fn weighted_ballots() {
    init();
    let ballots = vec![
        RawBallot::weighted(["A"], 1.25),
        RawBallot::weighted(["B"], 1.0),
        RawBallot::weighted(["C", "B"], 0.5),
    ];
    let res = run_election(
        &candidates(&["A", "B", "C"]),
        &ballots,
        &BallotRules::DEFAULT_RULES,
        &TallyConfig::default(),
    )
    .unwrap();
    assert_eq!(res.rounds[1].totals[&cid("B")], VoteCount::from_weight(1.5));
    assert_eq!(res.winner, Some(cid("B")));

    let json = serde_json::to_value(&res).unwrap();
    assert_eq!(json["total_accepted_weight"], serde_json::json!(2.75));
    assert_eq!(json["rounds"][1]["totals"]["B"], serde_json::json!(1.5));
}

#[test]
fn result_json_layout() {
    let res = run(&["A", "B"], &[&["A"], &["A"], &["B"]], &TallyConfig::default());
    let json = serde_json::to_value(&res).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "winner": "A",
            "outcome": "Winner",
            "rounds": [
                {
                    "round_number": 1,
                    "totals": {"A": 2, "B": 1},
                    "exhausted_weight": 0,
                    "eliminated": []
                }
            ],
            "rejected_ballots": [],
            "total_accepted_weight": 3,
            "total_rejected_count": 0
        })
    );
}

#[test]
fn batch_and_threads_together() {
    let config = TallyConfig {
        elimination_algorithm: EliminationAlgorithm::Batch,
        parallelism: Parallelism::Threads(NonZeroUsize::new(3).unwrap()),
        ..TallyConfig::default()
    };
    let mut rankings: Vec<&[&str]> = Vec::new();
    for _ in 0..2000 {
        rankings.push(&["A", "B"]);
        rankings.push(&["B"]);
        rankings.push(&["C", "A"]);
    }
    for _ in 0..500 {
        rankings.push(&["D", "C"]);
    }
    let res = run(&["A", "B", "C", "D"], &rankings, &config);
    let sequential = run(
        &["A", "B", "C", "D"],
        &rankings,
        &TallyConfig {
            elimination_algorithm: EliminationAlgorithm::Batch,
            ..TallyConfig::default()
        },
    );
    assert_eq!(res, sequential);
    // D goes out alone in the batch, then A and B are tied for last.
    assert_eq!(res.rounds[0].eliminated, vec![cid("D")]);
    assert_eq!(res.rounds[1].eliminated, vec![cid("A")]);
    assert_eq!(res.winner, Some(cid("B")));
}

#[test]
fn deadline_in_the_past_aborts() {
    init();
    let config = TallyConfig {
        deadline: Some(std::time::Instant::now()),
        ..TallyConfig::default()
    };
    let res = run_election(
        &candidates(&["A", "B"]),
        &ballots(&[&["A"], &["B"]]),
        &BallotRules::DEFAULT_RULES,
        &config,
    );
    match res {
        Err(TallyError::Aborted { partial, .. }) => assert!(partial.rounds.is_empty()),
        x => panic!("expected an aborted tally: {:?}", x),
    }
}
