pub use crate::config::*;
use crate::run_election;

/// A builder for adding ballots one at a time.
///
/// ```
/// pub use irv_tally::builder::Builder;
/// pub use irv_tally::{BallotRules, TallyConfig};
/// # use irv_tally::TallyError;
///
/// let mut builder = Builder::new(&BallotRules::DEFAULT_RULES, &TallyConfig::default())
///     .candidates(&["Anna".to_string(), "Bob".to_string()])?;
///
/// builder.add_ballot_simple(&["Anna".to_string(), "Bob".to_string()]);
/// builder.add_ballot(&["Bob".to_string()], 0.5);
///
/// let result = builder.run()?;
/// assert_eq!(result.winner.map(|cid| cid.to_string()), Some("Anna".to_string()));
/// # Ok::<(), TallyError>(())
/// ```
pub struct Builder {
    pub(crate) rules: BallotRules,
    pub(crate) config: TallyConfig,
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) ballots: Vec<RawBallot>,
}

impl Builder {
    pub fn new(rules: &BallotRules, config: &TallyConfig) -> Builder {
        Builder {
            rules: rules.clone(),
            config: config.clone(),
            candidates: Vec::new(),
            ballots: Vec::new(),
        }
    }

    /// Registers the candidates. The ids are also used as display names.
    pub fn candidates(self, ids: &[String]) -> Result<Builder, TallyError> {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            if candidates.iter().any(|c| c.id.as_str() == id) {
                return DuplicateCandidateSnafu { id: id.as_str() }.fail();
            }
            candidates.push(Candidate::new(id.as_str(), id.as_str()));
        }
        Ok(Builder {
            candidates,
            ballots: Vec::new(),
            ..self
        })
    }

    /// Adds a ballot with the default weight.
    ///
    /// It is the simplest use case for most cases.
    pub fn add_ballot_simple(&mut self, ranking: &[String]) {
        self.ballots.push(RawBallot::new(ranking.iter().map(|s| s.as_str())));
    }

    /// Adds a ballot with a weight attached to it.
    ///
    /// The ranking is checked when the election runs: ballots with unknown
    /// candidates or a bad weight are counted as rejected.
    pub fn add_ballot(&mut self, ranking: &[String], weight: f64) {
        self.ballots
            .push(RawBallot::weighted(ranking.iter().map(|s| s.as_str()), weight));
    }

    pub fn add_raw_ballot(&mut self, ballot: &RawBallot) {
        self.ballots.push(ballot.clone());
    }

    pub fn run(&self) -> Result<TallyResult, TallyError> {
        run_election(&self.candidates, &self.ballots, &self.rules, &self.config)
    }
}
