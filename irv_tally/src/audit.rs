//! Checksums to let a third party reproduce and verify a tally.
//!
//! The input checksum covers the candidates, the ballots and every rule that
//! can change the outcome. The deadline, the cancellation token and the
//! parallelism do not change a completed result and are left out.

use log::{debug, info};
use serde::Serialize;
use snafu::ResultExt;

use crate::config::*;
use crate::processor::normalize_ballots;
use crate::run_election;
use crate::validator::validate_ballots;

pub const ALGORITHM: &str = "irv-single-winner";

/// The checksum of the output of one stage of the tally.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStep {
    /// 1-based.
    pub step_number: usize,
    pub step_name: String,
    pub checksum: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub input_hash: String,
    pub result_hash: String,
    pub algorithm: String,
    pub version: String,
    /// Validation, input checksum, normalization, one step per round, and
    /// the final result, in this order.
    pub processing_steps: Vec<ProcessingStep>,
}

#[derive(Serialize)]
struct CanonicalInput<'a> {
    algorithm: &'static str,
    candidates: &'a [Candidate],
    ballots: &'a [RawBallot],
    ballot_rules: &'a BallotRules,
    majority_rule: MajorityRule,
    tiebreak: &'a [TieBreakStrategy],
    elimination_algorithm: EliminationAlgorithm,
}

#[derive(Serialize)]
struct CanonicalValidation<'a> {
    accepted: Vec<usize>,
    rejected: &'a [Rejection],
}

fn digest_json<T: Serialize>(value: &T) -> Result<String, TallyError> {
    let payload = serde_json::to_string(value).context(SerializationSnafu {})?;
    Ok(sha256::digest(payload))
}

/// The SHA-256 digest (hex) of the canonical JSON form of the input.
pub fn input_checksum(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
) -> Result<String, TallyError> {
    digest_json(&CanonicalInput {
        algorithm: ALGORITHM,
        candidates,
        ballots,
        ballot_rules: rules,
        majority_rule: config.majority_rule,
        tiebreak: &config.tiebreak,
        elimination_algorithm: config.elimination_algorithm,
    })
}

/// The SHA-256 digest (hex) of the canonical JSON form of a result.
pub fn result_checksum(result: &TallyResult) -> Result<String, TallyError> {
    digest_json(result)
}

/// The checksums of every stage that leads from the input to `result`.
///
/// Validation and normalization are computed again from the input. The
/// rounds and the final result are taken from `result`.
pub fn processing_steps(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
    result: &TallyResult,
) -> Result<Vec<ProcessingStep>, TallyError> {
    let report = validate_ballots(ballots, candidates, rules);
    let normalized = normalize_ballots(&report, rules);

    let mut checksums: Vec<(String, String)> = vec![
        (
            "validate_input".to_string(),
            digest_json(&CanonicalValidation {
                accepted: report.accepted.iter().map(|(idx, _)| *idx).collect(),
                rejected: &report.rejected,
            })?,
        ),
        (
            "compute_input_checksum".to_string(),
            input_checksum(candidates, ballots, rules, config)?,
        ),
        ("normalize_ballots".to_string(), digest_json(&normalized)?),
    ];
    for round in result.rounds.iter() {
        checksums.push((
            format!("count_round_{}", round.round_number),
            digest_json(round)?,
        ));
    }
    checksums.push(("final_result".to_string(), result_checksum(result)?));

    Ok(checksums
        .into_iter()
        .enumerate()
        .map(|(idx, (step_name, checksum))| ProcessingStep {
            step_number: idx + 1,
            step_name,
            checksum,
        })
        .collect())
}

pub fn audit_record(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
    result: &TallyResult,
) -> Result<AuditRecord, TallyError> {
    Ok(AuditRecord {
        input_hash: input_checksum(candidates, ballots, rules, config)?,
        result_hash: result_checksum(result)?,
        algorithm: ALGORITHM.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        processing_steps: processing_steps(candidates, ballots, rules, config, result)?,
    })
}

// Fails on the first step where the two logs differ. A step present on one
// side only is a mismatch too.
fn compare_steps(expected: &[ProcessingStep], actual: &[ProcessingStep]) -> Result<(), TallyError> {
    let missing = String::from("<missing>");
    for idx in 0..expected.len().max(actual.len()) {
        let (e, a) = (expected.get(idx), actual.get(idx));
        let same = match (e, a) {
            (Some(e), Some(a)) => e.step_name == a.step_name && e.checksum == a.checksum,
            _ => false,
        };
        if !same {
            let step_name = match (e, a) {
                (Some(step), _) | (None, Some(step)) => step.step_name.clone(),
                (None, None) => missing.clone(),
            };
            debug!("compare_steps: expected {:?} computed {:?}", e, a);
            return StepMismatchSnafu {
                step_number: idx + 1,
                step_name,
                expected: e.map_or_else(|| missing.clone(), |s| s.checksum.clone()),
                actual: a.map_or_else(|| missing.clone(), |s| s.checksum.clone()),
            }
            .fail();
        }
    }
    Ok(())
}

/// Runs the election again and checks that it produces the expected result.
///
/// The error names the first stage whose output differs.
pub fn verify_tally(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
    expected: &TallyResult,
) -> Result<(), TallyError> {
    let recomputed = run_election(candidates, ballots, rules, config)?;
    let expected_steps = processing_steps(candidates, ballots, rules, config, expected)?;
    let actual_steps = processing_steps(candidates, ballots, rules, config, &recomputed)?;
    compare_steps(&expected_steps, &actual_steps)?;
    info!(
        "verify_tally: result verified ({} steps)",
        actual_steps.len()
    );
    Ok(())
}

/// Runs the election again and checks it against a published audit record.
pub fn verify_audit_record(
    candidates: &[Candidate],
    ballots: &[RawBallot],
    rules: &BallotRules,
    config: &TallyConfig,
    record: &AuditRecord,
) -> Result<(), TallyError> {
    let recomputed = run_election(candidates, ballots, rules, config)?;
    let actual_steps = processing_steps(candidates, ballots, rules, config, &recomputed)?;
    compare_steps(&record.processing_steps, &actual_steps)?;
    info!("verify_audit_record: record {} verified", record.result_hash);
    Ok(())
}
