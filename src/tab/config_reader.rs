use crate::tab::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "contestDate")]
    pub contest_date: Option<String>,
    #[serde(rename = "contestJurisdiction")]
    pub contest_jurisdiction: Option<String>,
    #[serde(rename = "contestOffice")]
    pub contest_office: Option<String>,
    #[serde(rename = "outputFile")]
    pub output_file: Option<String>,
}

/// The description of the contest written in the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub contest: String,
    pub date: Option<String>,
    pub jurisdiction: Option<String>,
    pub office: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "firstVoteColumnIndex")]
    _first_vote_column_index: Option<JSValue>,
    #[serde(rename = "firstVoteRowIndex")]
    _first_vote_row_index: Option<JSValue>,
    #[serde(rename = "idColumnIndex")]
    pub id_column_index: Option<JSValue>,
    #[serde(rename = "weightColumnIndex")]
    pub weight_column_index: Option<JSValue>,
}

impl FileSource {
    /// A source with all the default settings.
    pub fn new(provider: &str, file_path: &str) -> FileSource {
        FileSource {
            provider: provider.to_string(),
            file_path: file_path.to_string(),
            _first_vote_column_index: None,
            _first_vote_row_index: None,
            id_column_index: None,
            weight_column_index: None,
        }
    }

    /// 0-based, defaults to the first column.
    pub fn first_vote_column_index(&self) -> TabResult<usize> {
        match &self._first_vote_column_index {
            None => Ok(0),
            x => Ok(read_js_int(x)? - 1),
        }
    }

    /// 1-based, defaults to the first row.
    pub fn first_vote_row_index(&self) -> TabResult<usize> {
        match &self._first_vote_row_index {
            None => Ok(1),
            x => read_js_int(x),
        }
    }

    /// 0-based.
    pub fn id_column_index_int(&self) -> TabResult<Option<usize>> {
        match &self.id_column_index {
            None => Ok(None),
            x => read_js_int(x).map(|i| Some(i - 1)),
        }
    }

    /// 0-based.
    pub fn weight_column_index_int(&self) -> TabResult<Option<usize>> {
        match &self.weight_column_index {
            None => Ok(None),
            x => read_js_int(x).map(|i| Some(i - 1)),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TabCandidate {
    pub id: String,
    pub name: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabRules {
    #[serde(rename = "majorityRule")]
    pub majority_rule: Option<String>,
    #[serde(rename = "tiebreakMode")]
    pub tiebreak_mode: Option<Vec<String>>,
    #[serde(rename = "randomSeed")]
    pub random_seed: Option<String>,
    #[serde(rename = "batchElimination")]
    pub batch_elimination: Option<bool>,
    #[serde(rename = "weightedBallots")]
    pub weighted_ballots: Option<bool>,
    #[serde(rename = "maxRankingsAllowed")]
    pub max_rankings_allowed: Option<JSValue>,
    #[serde(rename = "threads")]
    pub threads: Option<usize>,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TabConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "ballotSources")]
    pub ballot_sources: Vec<FileSource>,
    pub candidates: Vec<TabCandidate>,
    #[serde(default)]
    pub rules: TabRules,
}

pub fn read_config(path: &str) -> TabResult<TabConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: TabConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> TabResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

// Indexes start at 1. Spreadsheet column names are also accepted.
fn read_js_int(x: &Option<JSValue>) -> TabResult<usize> {
    let res = match x {
        Some(JSValue::Number(n)) => n.as_u64().map(|x| x as usize),
        Some(JSValue::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            Some(
                s.to_ascii_uppercase()
                    .chars()
                    .fold(0, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1)),
            )
        }
        Some(JSValue::String(s)) => s.parse::<usize>().ok(),
        _ => None,
    };
    match res {
        Some(i) if i >= 1 => Ok(i),
        _ => ParsingJsonNumberSnafu {
            value: format!("{:?}", x),
        }
        .fail(),
    }
}
