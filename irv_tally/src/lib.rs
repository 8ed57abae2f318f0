/*!
Single-winner instant-runoff (IRV) tallying.

Ballots go through four stages:
- [`validator`] accepts or rejects each ballot
- [`processor`] removes repeated rankings and resolves the weights
- [`engine`] runs the elimination rounds
- [`results`] packages the rounds into a [`TallyResult`]

[`run_election`] chains all of them. See the [`manual`] for the detailed
counting rules.
*/

mod config;

pub mod audit;
pub mod builder;
pub mod engine;
pub mod manual;
pub mod processor;
pub mod results;
pub mod tiebreak;
pub mod validator;

use log::{debug, info};

pub use crate::config::*;

/// Tallies ballots that are already normalized.
///
/// There is no rejected ballot in this case. An aborted tally is returned as
/// [`TallyError::Aborted`].
pub fn tally(
    candidates: &[Candidate],
    ballots: &[NormalizedBallot],
    config: &TallyConfig,
) -> Result<TallyResult, TallyError> {
    let trace = engine::count_rounds(candidates, ballots, config)?;
    finish(results::aggregate(&trace, &[], trace.total_weight))
}

/// Validates, normalizes and tallies raw ballots.
///
/// Arguments:
/// * `candidates` the registered candidates
/// * `ballots` the submitted ballots, in any order
/// * `rules` the admission rules for the ballots
/// * `config` the counting rules
///
/// Rejected ballots are counted in the result. The tally fails if no ballot
/// is accepted.
pub fn run_election(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
) -> Result<TallyResult, TallyError> {
    info!(
        "Processing {:?} ballots, {:?} candidates, rules: {:?}",
        ballots.len(),
        candidates.len(),
        rules
    );
    let report = validator::validate_ballots(ballots, candidates, rules);
    let normalized = processor::normalize_ballots(&report, rules);
    debug!(
        "run_election: {} normalized ballots, {} rejected",
        normalized.len(),
        report.rejected_count()
    );
    let trace = engine::count_rounds(candidates, &normalized, config)?;
    finish(results::aggregate(&trace, &report.rejected, trace.total_weight))
}

fn finish(result: TallyResult) -> Result<TallyResult, TallyError> {
    if result.outcome == Outcome::Aborted {
        let rounds_completed = result.round_count();
        return AbortedSnafu {
            rounds_completed,
            partial: Box::new(result),
        }
        .fail();
    }
    Ok(result)
}
