// Reading ballots stored as a JSON array.

use serde::Deserialize;

use crate::tab::{io_common::make_default_id, *};

#[derive(Debug, Clone, Deserialize)]
struct JsonBallot {
    id: Option<String>,
    ranking: Vec<String>,
    weight: Option<f64>,
}

pub fn read_json_ballots(path: &str) -> TabResult<Vec<ParsedBallot>> {
    let default_id = make_default_id(path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let ballots: Vec<JsonBallot> = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_json_ballots: {} ballots in {}", ballots.len(), path);
    Ok(ballots
        .into_iter()
        .enumerate()
        .map(|(idx, jb)| ParsedBallot {
            id: Some(jb.id.unwrap_or_else(|| default_id(idx + 1))),
            weight: jb.weight,
            choices: jb.ranking,
        })
        .collect())
}
