// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize, Serializer};
use snafu::Snafu;

/// Rounds are numbered from 1.
pub type RoundNumber = u32;

/// The stable identifier of a candidate.
///
/// Identifiers are compared by the byte order of the underlying string. This is
/// the order used by the [`TieBreakStrategy::LexicographicId`] strategy.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> CandidateId {
        CandidateId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> CandidateId {
        CandidateId(id.to_string())
    }
}

impl From<String> for CandidateId {
    fn from(id: String) -> CandidateId {
        CandidateId(id)
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered candidate. The display name is carried for the callers and is
/// never looked at by the tally.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub display_name: String,
}

impl Candidate {
    pub fn new(id: impl Into<CandidateId>, display_name: impl Into<String>) -> Candidate {
        Candidate {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// The status of a candidate during one tally.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum CandidateStatus {
    Active,
    /// Eliminated at the end of the given round.
    Eliminated(RoundNumber),
}

impl CandidateStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, CandidateStatus::Active)
    }
}

/// A ballot as submitted by the voter, before any validation.
///
/// The first element of the ranking is the first choice. The weight defaults
/// to 1 when it is not provided.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RawBallot {
    pub ranking: Vec<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl RawBallot {
    pub fn new<I, S>(ranking: I) -> RawBallot
    where
        I: IntoIterator<Item = S>,
        S: Into<CandidateId>,
    {
        RawBallot {
            ranking: ranking.into_iter().map(|s| s.into()).collect(),
            weight: None,
        }
    }

    pub fn weighted<I, S>(ranking: I, weight: f64) -> RawBallot
    where
        I: IntoIterator<Item = S>,
        S: Into<CandidateId>,
    {
        RawBallot {
            weight: Some(weight),
            ..RawBallot::new(ranking)
        }
    }
}

/// A ballot ready to be counted: distinct candidates in rank order.
///
/// The ranking may be shorter than the candidate list (undervote).
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct NormalizedBallot {
    ranking: Vec<CandidateId>,
    weight: VoteCount,
}

impl NormalizedBallot {
    pub fn new(ranking: Vec<CandidateId>, weight: VoteCount) -> NormalizedBallot {
        NormalizedBallot { ranking, weight }
    }

    pub fn ranking(&self) -> &[CandidateId] {
        &self.ranking
    }

    pub fn weight(&self) -> VoteCount {
        self.weight
    }
}

/// A quantity of votes, in fixed point.
///
/// One vote is [`VoteCount::SCALE`] units, so that fractional ballot weights
/// are summed exactly and in any order.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Default)]
pub struct VoteCount(u64);

impl VoteCount {
    /// Four decimal places.
    pub const SCALE: u64 = 10_000;
    pub const EMPTY: VoteCount = VoteCount(0);
    pub const ONE: VoteCount = VoteCount(VoteCount::SCALE);

    pub fn from_votes(votes: u64) -> VoteCount {
        VoteCount(votes.saturating_mul(VoteCount::SCALE))
    }

    pub fn from_units(units: u64) -> VoteCount {
        VoteCount(units)
    }

    /// Converts a (validated) ballot weight, rounding to the nearest unit.
    /// Negative or NaN weights map to zero.
    pub fn from_weight(weight: f64) -> VoteCount {
        let units = (weight * VoteCount::SCALE as f64).round();
        if units.is_nan() || units <= 0.0 {
            VoteCount::EMPTY
        } else {
            // Saturating cast.
            VoteCount(units as u64)
        }
    }

    /// `None` if the sum does not fit.
    pub fn checked_add(self, rhs: VoteCount) -> Option<VoteCount> {
        self.0.checked_add(rhs.0).map(VoteCount)
    }

    pub fn units(self) -> u64 {
        self.0
    }

    pub fn is_whole(self) -> bool {
        self.0 % VoteCount::SCALE == 0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / VoteCount::SCALE as f64
    }

    /// The smallest count that is strictly more than half of this one:
    /// `floor(self / 2) + 1` unit.
    pub fn majority(self) -> VoteCount {
        VoteCount(self.0 / 2 + 1)
    }
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(VoteCount::EMPTY, |acc, vc| acc + vc)
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0.saturating_add(rhs.0))
    }
}

impl Display for VoteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / VoteCount::SCALE;
        let frac = self.0 % VoteCount::SCALE;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:04}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

// Whole counts are written as integers, so that unweighted elections only
// contain integers in their output.
impl Serialize for VoteCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_whole() {
            serializer.serialize_u64(self.0 / VoteCount::SCALE)
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum Outcome {
    Winner,
    /// The remaining candidates were tied and no tie-break could separate them.
    NoWinner,
    /// The tally was cancelled between two rounds.
    Aborted,
}

/// Why a ballot was excluded from the count.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Serialize)]
pub enum RejectionReason {
    EmptyRanking,
    NonPositiveWeight,
    /// Not a number, infinite, or larger than the accepted maximum.
    WeightOutOfRange,
    UnknownCandidate,
}

/// One rejected ballot.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct Rejection {
    /// Position of the ballot in the submitted batch.
    pub ballot_index: usize,
    pub reason: RejectionReason,
    /// The offending candidate for [`RejectionReason::UnknownCandidate`].
    pub candidate: Option<CandidateId>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct RejectionCount {
    pub reason: RejectionReason,
    pub count: u64,
}

/// Statistics for one round
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct Round {
    pub round_number: RoundNumber,
    /// The totals of the candidates still active in this round.
    pub totals: BTreeMap<CandidateId, VoteCount>,
    /// The weight of all the ballots exhausted so far.
    pub exhausted_weight: VoteCount,
    pub eliminated: Vec<CandidateId>,
}

impl Round {
    pub fn continuing_weight(&self) -> VoteCount {
        self.totals.values().cloned().sum()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct TallyResult {
    pub winner: Option<CandidateId>,
    pub outcome: Outcome,
    pub rounds: Vec<Round>,
    pub rejected_ballots: Vec<RejectionCount>,
    pub total_accepted_weight: VoteCount,
    pub total_rejected_count: u64,
    #[serde(skip)]
    pub total_exhausted_weight: VoteCount,
}

impl TallyResult {
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

/// Errors that prevent the tally from producing a result.
///
/// Rejected ballots and elections without a winner are not errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TallyError {
    #[snafu(display("the election has no candidate"))]
    EmptyCandidateSet {},

    #[snafu(display("candidate {id} is registered more than once"))]
    DuplicateCandidate { id: CandidateId },

    #[snafu(display("no ballot was accepted for counting"))]
    NoBallots {},

    #[snafu(display("a ballot refers to the unregistered candidate {id}"))]
    UnknownBallotCandidate { id: CandidateId },

    #[snafu(display("a ballot ranks candidate {id} more than once"))]
    DuplicateBallotCandidate { id: CandidateId },

    #[snafu(display("the total weight of the ballots is too large to be counted"))]
    WeightOverflow {},

    #[snafu(display("tally aborted after {rounds_completed} completed rounds"))]
    Aborted {
        rounds_completed: usize,
        partial: Box<TallyResult>,
    },

    #[snafu(display(
        "tally step {step_number} ({step_name}) differs: expected {expected}, computed {actual}"
    ))]
    StepMismatch {
        step_number: usize,
        step_name: String,
        expected: String,
        actual: String,
    },

    #[snafu(display("could not serialize the tally data"))]
    Serialization { source: serde_json::Error },
}

// ********* Configuration **********

/// How the winning threshold is computed.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum MajorityRule {
    /// Recomputed each round from the ballots that still carry an active preference.
    ContinuingBallots,
    /// Fixed in the first round from all the accepted ballots.
    TotalValidBallots,
}

/// A way to separate candidates tied for the lowest total.
///
/// Strategies are applied in order on the candidates that the previous
/// strategies could not separate.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum TieBreakStrategy {
    /// Eliminate the candidate with the lowest total in the previous round,
    /// going back further while the tie persists.
    PreviousRoundTotals,
    /// A fixed pseudo-random permutation derived from the seed, the round and
    /// the candidate ids.
    Random { seed: u64 },
    /// Eliminate the candidate with the smallest id.
    LexicographicId,
}

/// The elimination algorithm to apply.
///
/// - Single eliminates one candidate at a time (ties that no strategy resolves
/// excepted).
///
/// - Batch eliminates at once all the lowest candidates whose combined total
/// is below the total of the next candidate: no transfer between them can
/// change the order. It falls back to the single rule when no such group exists.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum EliminationAlgorithm {
    Batch,
    Single,
}

/// How the ballots of one round are scanned.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Parallelism {
    Sequential,
    /// Split the ballots into at most this many contiguous chunks, scanned on
    /// scoped threads.
    Threads(NonZeroUsize),
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum WeightMode {
    /// Declared weights are validated and applied.
    Weighted,
    /// Every ballot counts for one vote, whatever its declared weight.
    Unweighted,
}

/// The rules applied to the ballots before counting.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct BallotRules {
    pub weight_mode: WeightMode,
    /// Only the first rankings (after removing duplicates) are kept.
    pub max_rankings_allowed: Option<NonZeroUsize>,
}

impl BallotRules {
    pub const DEFAULT_RULES: BallotRules = BallotRules {
        weight_mode: WeightMode::Weighted,
        max_rankings_allowed: None,
    };
}

impl Default for BallotRules {
    fn default() -> Self {
        BallotRules::DEFAULT_RULES
    }
}

/// A flag shared with the caller to stop a running tally.
///
/// The tally checks it before starting each round.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct TallyConfig {
    pub majority_rule: MajorityRule,
    pub tiebreak: Vec<TieBreakStrategy>,
    pub elimination_algorithm: EliminationAlgorithm,
    pub parallelism: Parallelism,
    pub deadline: Option<Instant>,
    pub cancellation: Option<CancellationToken>,
}

impl TallyConfig {
    pub(crate) fn interrupted(&self) -> bool {
        let expired = self.deadline.map_or(false, |d| Instant::now() >= d);
        let cancelled = self
            .cancellation
            .as_ref()
            .map_or(false, |token| token.is_cancelled());
        expired || cancelled
    }
}

impl Default for TallyConfig {
    fn default() -> Self {
        TallyConfig {
            majority_rule: MajorityRule::ContinuingBallots,
            tiebreak: vec![
                TieBreakStrategy::PreviousRoundTotals,
                TieBreakStrategy::LexicographicId,
            ],
            elimination_algorithm: EliminationAlgorithm::Single,
            parallelism: Parallelism::Sequential,
            deadline: None,
            cancellation: None,
        }
    }
}
