use serde::{Deserialize, Serialize};

use crate::models::Poll;
use crate::tally::OptionTally;

/**
 * User-provided details to create or update a poll
 */
#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
}

/**
 * A single cast: the index of the chosen option
 */
#[derive(Debug, Deserialize)]
pub struct BallotRequest {
    pub option: i64,
}

/*
 * Responses all carry an `error` field so callers branch on one shape,
 * whether the operation succeeded or not.
 */

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub error: Option<String>,
    pub poll: Poll,
}

#[derive(Debug, Serialize)]
pub struct PollListResponse {
    pub error: Option<String>,
    pub polls: Vec<Poll>,
}

/**
 * Results for a given poll, counts in poll option order
 */
#[derive(Debug, Serialize)]
pub struct TallyResponse {
    pub error: Option<String>,
    pub poll: Poll,
    pub results: Vec<OptionTally>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    pub error: Option<String>,
}

impl Acknowledged {
    pub fn ok() -> Self {
        Self { error: None }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/*
 * HTML form bodies, decoded with serde_qs. The new/edit forms post their
 * option inputs as indexed fields (options[0], options[1], ...).
 */

#[derive(Debug, Deserialize)]
pub struct PollForm {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    pub option: i64,
}
