use log::{debug, info, warn};

use irv_tally::validator::validate_ballots;
use irv_tally::*;
use snafu::{prelude::*, ErrorCompat, Snafu};

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::tab::config_reader::*;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_json;

#[derive(Debug, Snafu)]
pub enum TabError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON content"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a positive index, found {value}"))]
    ParsingJsonNumber { value: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a CSV line"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("CSV line {lineno} is too short"))]
    CsvLineToShort { lineno: usize },
    #[snafu(display("Could not read weight {value:?} on CSV line {lineno}"))]
    CsvWeightParse { lineno: usize, value: String },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Tabulation failed: {source}"))]
    Tally { source: TallyError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TabResult<T> = Result<T, TabError>;

/// A ballot as read from a file, before any check.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedBallot {
    pub id: Option<String>,
    pub weight: Option<f64>,
    /// The cells in rank order. Empty cells are skipped rankings.
    pub choices: Vec<String>,
}

impl ParsedBallot {
    fn to_raw_ballot(&self) -> RawBallot {
        RawBallot {
            ranking: self
                .choices
                .iter()
                .filter(|c| !c.is_empty())
                .map(|c| CandidateId::from(c.as_str()))
                .collect(),
            weight: self.weight,
        }
    }
}

fn read_ranking_data(root_path: &Path, cfs: &FileSource) -> TabResult<Vec<ParsedBallot>> {
    let p: PathBuf = root_path.join(&cfs.file_path);
    let p2 = p.as_path().display().to_string();
    info!("Attempting to read rank file {:?}", p2);
    match cfs.provider.as_str() {
        "csv" => io_csv::read_csv_ranking(&p2, cfs),
        "json" => io_json::read_json_ballots(&p2),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

fn validate_rules(rules: &TabRules) -> TabResult<(BallotRules, TallyConfig)> {
    let majority_rule = match rules.majority_rule.as_deref() {
        None | Some("continuingBallots") => MajorityRule::ContinuingBallots,
        Some("totalValidBallots") => MajorityRule::TotalValidBallots,
        Some(x) => whatever!("Unknown majority rule {:?}", x),
    };

    let tiebreak: Vec<TieBreakStrategy> = match &rules.tiebreak_mode {
        None => TallyConfig::default().tiebreak,
        Some(modes) => {
            let mut res: Vec<TieBreakStrategy> = Vec::new();
            for mode in modes.iter() {
                let strategy = match mode.as_str() {
                    "previousRoundTotals" => TieBreakStrategy::PreviousRoundTotals,
                    "lexicographicId" => TieBreakStrategy::LexicographicId,
                    "random" => {
                        let seed = match rules.random_seed.as_ref().map(|s| s.parse::<u64>()) {
                            Some(Result::Ok(x)) => x,
                            x => {
                                whatever!("Cannot use tiebreak mode random with seed {:?}", x)
                            }
                        };
                        TieBreakStrategy::Random { seed }
                    }
                    x => whatever!("Unknown tiebreak mode {:?}", x),
                };
                res.push(strategy);
            }
            res
        }
    };

    let max_rankings_allowed = match &rules.max_rankings_allowed {
        None => None,
        Some(JSValue::String(s)) if s == "max" => None,
        Some(JSValue::Number(n)) if n.as_u64().map_or(false, |x| x > 0) => {
            n.as_u64().and_then(|x| NonZeroUsize::new(x as usize))
        }
        Some(JSValue::String(s)) if s.parse::<usize>().map_or(false, |x| x > 0) => {
            s.parse::<usize>().ok().and_then(NonZeroUsize::new)
        }
        x => whatever!("Failed to understand maxRankingsAllowed option: {:?}", x),
    };

    let parallelism = match rules.threads.and_then(NonZeroUsize::new) {
        Some(n) if n.get() > 1 => Parallelism::Threads(n),
        _ => Parallelism::Sequential,
    };

    let ballot_rules = BallotRules {
        weight_mode: if rules.weighted_ballots.unwrap_or(true) {
            WeightMode::Weighted
        } else {
            WeightMode::Unweighted
        },
        max_rankings_allowed,
    };
    let config = TallyConfig {
        majority_rule,
        tiebreak,
        elimination_algorithm: if rules.batch_elimination.unwrap_or(false) {
            EliminationAlgorithm::Batch
        } else {
            EliminationAlgorithm::Single
        },
        parallelism,
        deadline: None,
        cancellation: None,
    };
    Ok((ballot_rules, config))
}

fn build_summary_js(
    settings: &OutputSettings,
    result: &TallyResult,
    audit: Option<&audit::AuditRecord>,
) -> JSValue {
    let c = OutputConfig {
        contest: settings.contest_name.clone(),
        date: settings.contest_date.clone(),
        jurisdiction: settings.contest_jurisdiction.clone(),
        office: settings.contest_office.clone(),
    };
    json!({
        "config": c,
        "results": result,
        "audit": audit })
}

fn write_summary(summary: &JSValue, out: Option<&str>) -> TabResult<()> {
    let pretty_js_stats = serde_json::to_string_pretty(summary).context(ParsingJsonSnafu {})?;
    match out {
        None | Some("stdout") => {
            println!("{}", pretty_js_stats);
        }
        Some(path) => {
            info!("Writing summary to {}", path);
            fs::write(path, pretty_js_stats).context(WritingOutputSnafu { path })?;
        }
    }
    Ok(())
}

// Only the config and the results are compared: the audit block changes with
// the version of the program.
fn check_summary(summary: &JSValue, reference_path: &str) -> TabResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let comparable = |js: &JSValue| json!({"config": js["config"], "results": js["results"]});
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&comparable(&summary_ref)).context(ParsingJsonSnafu {})?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&comparable(summary)).context(ParsingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary {}", reference_path);
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats.as_ref(), "\n");
        whatever!("Difference detected between calculated summary and reference summary")
    }
    info!("Summary matches the reference {}", reference_path);
    Ok(())
}

/// Runs an election described by a configuration.
///
/// The ballot file paths are relative to `root_path`. The summary goes to
/// `out`, or else to the output file of the configuration, or else to stdout.
pub fn run_election(
    config: &TabConfig,
    root_path: &Path,
    out: Option<&str>,
    check_summary_path: Option<&str>,
) -> TabResult<()> {
    info!("config: {:?}", config);

    let (ballot_rules, mut tally_config) = validate_rules(&config.rules)?;
    if let Some(ms) = config.rules.timeout_ms {
        tally_config.deadline = Some(Instant::now() + Duration::from_millis(ms));
    }

    if config.ballot_sources.is_empty() {
        whatever!("No ballot source detected");
    }

    let mut parsed: Vec<ParsedBallot> = Vec::new();
    for cfs in config.ballot_sources.iter() {
        let mut file_data = read_ranking_data(root_path, cfs)?;
        parsed.append(&mut file_data);
    }
    info!("Read {} ballots", parsed.len());

    let candidates: Vec<Candidate> = config
        .candidates
        .iter()
        .map(|c| Candidate::new(c.id.as_str(), c.name.clone().unwrap_or_else(|| c.id.clone())))
        .collect();
    let ballots: Vec<RawBallot> = parsed.iter().map(|pb| pb.to_raw_ballot()).collect();

    for rejection in validate_ballots(&ballots, &candidates, &ballot_rules).rejected.iter() {
        let ballot_id = parsed[rejection.ballot_index].id.clone().unwrap_or_default();
        warn!(
            "ballot {}: rejected: {:?} {}",
            ballot_id,
            rejection.reason,
            rejection.candidate.as_ref().map(|c| c.to_string()).unwrap_or_default()
        );
    }

    let result = match irv_tally::run_election(&candidates, &ballots, &ballot_rules, &tally_config)
    {
        Result::Ok(x) => x,
        Result::Err(TallyError::Aborted {
            rounds_completed,
            partial,
        }) => {
            warn!(
                "Tabulation aborted after {} rounds, writing the partial summary",
                rounds_completed
            );
            let summary = build_summary_js(&config.output_settings, &partial, None);
            write_summary(&summary, out)?;
            return Err(TallyError::Aborted {
                rounds_completed,
                partial,
            })
            .context(TallySnafu {});
        }
        Result::Err(x) => return Err(x).context(TallySnafu {}),
    };
    debug!("result: {:?}", result);

    let audit = audit::audit_record(&candidates, &ballots, &ballot_rules, &tally_config, &result)
        .context(TallySnafu {})?;
    let summary = build_summary_js(&config.output_settings, &result, Some(&audit));

    let out = out.or(config.output_settings.output_file.as_deref());
    write_summary(&summary, out)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        check_summary(&summary, summary_p)?;
    }

    Ok(())
}

// A configuration for tabulating a single file with the default rules.
fn config_from_args(args: &Args, input: &str) -> TabResult<TabConfig> {
    let ids = match &args.candidates {
        Some(ids) if !ids.is_empty() => ids.clone(),
        _ => whatever!("--candidates is required when no configuration file is given"),
    };
    let provider = args.input_type.clone().unwrap_or_else(|| "csv".to_string());
    Ok(TabConfig {
        output_settings: OutputSettings {
            contest_name: io_common::simplify_file_name(input),
            contest_date: None,
            contest_jurisdiction: None,
            contest_office: None,
            output_file: None,
        },
        ballot_sources: vec![FileSource::new(&provider, input)],
        candidates: ids
            .into_iter()
            .map(|id| TabCandidate { id, name: None })
            .collect(),
        rules: TabRules::default(),
    })
}

pub fn run(args: &Args) -> TabResult<()> {
    match (&args.config, &args.input) {
        (Some(config_path), input) => {
            let mut config = read_config(config_path)?;
            let root_p = Path::new(config_path.as_str())
                .parent()
                .context(MissingParentDirSnafu {})?;
            let root_p = if let Some(input) = input {
                let provider = args.input_type.clone().unwrap_or_else(|| "csv".to_string());
                config.ballot_sources = vec![FileSource::new(&provider, input)];
                Path::new(".")
            } else {
                root_p
            };
            run_election(&config, root_p, args.out.as_deref(), args.reference.as_deref())
        }
        (None, Some(input)) => {
            let config = config_from_args(args, input)?;
            run_election(&config, Path::new("."), args.out.as_deref(), args.reference.as_deref())
        }
        (None, None) => whatever!("Either --config or --input must be provided"),
    }
}

pub fn report_error(e: &TabError) {
    eprintln!("An error occured {}", e);
    if let Some(bt) = ErrorCompat::backtrace(e) {
        eprintln!("trace: {}", bt);
    }
}

#[cfg(test)]
fn run_election_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
    let test_dir =
        option_env!("RCV_TEST_DIR").unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"));
    info!("Running test {}", test_name);
    let config_path = format!("{}/{}/{}", test_dir, test_name, config_lpath);
    let summary_path = format!("{}/{}/{}", test_dir, test_name, summary_lpath);
    let out_path = std::env::temp_dir()
        .join(format!("rcvtally-{}-{}.json", std::process::id(), test_name))
        .display()
        .to_string();
    let res = read_config(&config_path).and_then(|config| {
        let root_p = Path::new(config_path.as_str())
            .parent()
            .context(MissingParentDirSnafu {})?;
        run_election(&config, root_p, Some(&out_path), Some(&summary_path))
    });
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        report_error(&e);
        panic!("test {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    run_election_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}
