use thiserror::Error;
use tide::StatusCode;

use crate::store::StoreError;

/**
 * Every failure a poll operation can surface.
 *
 * These cross the API boundary as `{"error": "..."}` payloads rather than as
 * raised errors, so the display strings below are the user-visible messages.
 */
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PollError {
    #[error("Question must be between 5 and 500 characters.")]
    QuestionLength,

    #[error("Please provide between 2 and 10 options.")]
    OptionCount,

    #[error("Each option must be between 1 and 200 characters.")]
    OptionLength,

    #[error("Options cannot be changed once votes have been cast.")]
    OptionsLocked,

    #[error("You must be logged in to do that.")]
    NotAuthenticated,

    #[error("You do not have permission to modify this poll.")]
    NotAuthorized,

    #[error("Poll not found.")]
    PollNotFound,

    #[error("Invalid vote option.")]
    InvalidOption,

    #[error("You have already voted on this poll.")]
    DuplicateVote,

    /**
     * The underlying message is passed through as-is, matching how the
     * original service surfaced store failures to its callers.
     */
    #[error("{0}")]
    Store(String),
}

impl PollError {
    /**
     * The HTTP status the JSON API answers with for this error
     */
    pub fn http_status(&self) -> StatusCode {
        match self {
            PollError::QuestionLength
            | PollError::OptionCount
            | PollError::OptionLength
            | PollError::OptionsLocked
            | PollError::InvalidOption => StatusCode::BadRequest,
            PollError::NotAuthenticated => StatusCode::Unauthorized,
            PollError::NotAuthorized => StatusCode::Forbidden,
            PollError::PollNotFound => StatusCode::NotFound,
            PollError::DuplicateVote => StatusCode::Conflict,
            PollError::Store(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<StoreError> for PollError {
    fn from(err: StoreError) -> Self {
        match err {
            /*
             * The votes table's unique index is the backstop for the
             * at-most-one-vote invariant; its violation is a duplicate vote,
             * not an internal error.
             */
            StoreError::Duplicate => PollError::DuplicateVote,
            StoreError::Database(message) => PollError::Store(message),
        }
    }
}
