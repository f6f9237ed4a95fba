/**
 * Tally computation.
 *
 * Tallies are derived on demand from the vote records and never stored, so
 * they cannot drift from the votes underneath them.
 */
use log::*;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::PollError;
use crate::models::Poll;
use crate::store::PollStore;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionTally {
    pub option: String,
    pub votes: i64,
}

/**
 * Per-option counts in the poll's own option order, plus the total
 */
#[derive(Clone, Debug, Serialize)]
pub struct PollResults {
    pub poll: Poll,
    pub results: Vec<OptionTally>,
    pub total: i64,
}

/**
 * Compute the current results for a poll.
 *
 * Every option starts at zero, including options nobody has picked. A vote
 * whose stored text no longer matches any option is skipped rather than
 * failing the whole tally.
 */
pub async fn compute_results(
    store: &dyn PollStore,
    poll_id: Uuid,
) -> Result<PollResults, PollError> {
    let poll = store
        .fetch_poll(poll_id)
        .await?
        .ok_or(PollError::PollNotFound)?;

    let mut results: Vec<OptionTally> = poll
        .options
        .iter()
        .map(|option| OptionTally {
            option: option.clone(),
            votes: 0,
        })
        .collect();

    let mut total = 0;

    for vote in store.votes_for_poll(poll_id).await? {
        match results.iter_mut().find(|tally| tally.option == vote.option) {
            Some(tally) => {
                tally.votes += 1;
                total += 1;
            }
            None => {
                debug!(
                    "Skipping vote for unknown option {:?} on poll {}",
                    vote.option, poll.id
                );
            }
        }
    }

    Ok(PollResults {
        poll,
        results,
        total,
    })
}

/**
 * Share of the total as a whole percentage.
 *
 * A poll with no votes reports 0% for every option rather than dividing by
 * zero.
 */
pub fn percentage(votes: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    ((votes as f64 / total as f64) * 100.0).round() as i64
}
