/*!

This is the long-form manual for `irv_tally` and `rcvtally`.

## Counting rules

Each round:
1. Every ballot counts for its highest-ranked candidate still in the race.
   A ballot with no such candidate is exhausted for the rest of the count.
2. The winning threshold is more than half of the weight of the continuing
   ballots (or of all the accepted ballots with `totalValidBallots`).
3. A single candidate left in the race wins. A candidate reaching the
   threshold wins.
4. Otherwise the lowest candidate is eliminated. Ties for the lowest total
   go through the configured tie-break strategies, in order.

When the strategies cannot separate the tied candidates, all of them are
eliminated together. If that would remove every remaining candidate, the
election ends without a winner.

Weights are counted in fixed point with four decimals. A weight of
`0.00004` rounds to zero, so its ballot is rejected like a zero weight.

## Ballots

A ballot is rejected when:
- its ranking is empty (`EmptyRanking`)
- its weight is zero or negative, or rounds to zero (`NonPositiveWeight`)
- its weight is not a number, infinite or above 10^9 (`WeightOutOfRange`)
- it ranks a candidate that is not registered (`UnknownCandidate`)

A candidate ranked several times only counts at its first position.

## Input formats

### `csv`

One ballot per line, one ranking per column. Empty cells are skipped
rankings. The configuration tells which column holds the first choice
(`firstVoteColumnIndex`, default 1), the first line with ballots
(`firstVoteRowIndex`, default 1), and optionally the columns holding a
ballot id (`idColumnIndex`) and a weight (`weightColumnIndex`). Indexes start
at 1 and may also be given as spreadsheet letters (`"A"`, `"AB"`).

### `json`

An array of ballots:

```text
[
  {"id": "b-001", "ranking": ["A", "B"]},
  {"ranking": ["C"], "weight": 2.5}
]
```

## Configuration file

```text
{
  "outputSettings": {"contestName": "Board election", "outputFile": "summary.json"},
  "ballotSources": [{"provider": "csv", "filePath": "ballots.csv"}],
  "candidates": [{"id": "A", "name": "Alice"}, {"id": "B"}],
  "rules": {
    "majorityRule": "continuingBallots",
    "tiebreakMode": ["previousRoundTotals", "random"],
    "randomSeed": "42",
    "batchElimination": false,
    "weightedBallots": true,
    "maxRankingsAllowed": "max",
    "threads": 4,
    "timeoutMs": 60000
  }
}
```

`majorityRule` is `continuingBallots` (default) or `totalValidBallots`.
`tiebreakMode` is a list of `previousRoundTotals`, `random` (requires
`randomSeed`) and `lexicographicId`. By default, it is
`["previousRoundTotals", "lexicographicId"]`.

## Audit

An audit record lists the SHA-256 checksum of each processing step:
`validate_input`, `compute_input_checksum`, `normalize_ballots`, one
`count_round_N` per round, and `final_result`. Verifying a tally runs it
again and reports the first step whose checksum differs.

## Library usage

```
use irv_tally::*;

let candidates = vec![
    Candidate::new("A", "Alice"),
    Candidate::new("B", "Bob"),
    Candidate::new("C", "Carol"),
];
let ballots = vec![
    RawBallot::new(["A", "B"]),
    RawBallot::new(["B", "A"]),
    RawBallot::new(["C", "B"]),
    RawBallot::new(["B"]),
    RawBallot::new(["A"]),
];
let result = run_election(
    &candidates,
    &ballots,
    &BallotRules::DEFAULT_RULES,
    &TallyConfig::default(),
)?;
assert_eq!(result.winner, Some(CandidateId::from("B")));
assert_eq!(result.rounds.len(), 2);

let record = audit::audit_record(
    &candidates,
    &ballots,
    &BallotRules::DEFAULT_RULES,
    &TallyConfig::default(),
    &result,
)?;
// Validation, input checksum, normalization, two rounds, final result.
assert_eq!(record.processing_steps.len(), 6);
audit::verify_audit_record(
    &candidates,
    &ballots,
    &BallotRules::DEFAULT_RULES,
    &TallyConfig::default(),
    &record,
)?;
# Ok::<(), TallyError>(())
```

*/
