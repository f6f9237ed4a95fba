use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/**
 * A poll as stored in the `polls` table.
 *
 * The options live inline on the row as an ordered text array. The position
 * of an option is how voters address it when casting; the text is what a
 * recorded vote keeps.
 */
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * A single recorded vote
 *
 * `voted_by` is None for anonymous ballots, which are accepted when the
 * server runs with open voting.
 */
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Vote {
    pub poll_id: Uuid,
    pub voted_by: Option<Uuid>,
    pub option: String,
    pub created_at: DateTime<Utc>,
}
