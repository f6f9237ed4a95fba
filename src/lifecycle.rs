/**
 * The poll lifecycle coordinator.
 *
 * Each public operation is one logical unit: validate, confirm the target
 * exists, authorize, then issue a single write. Nothing here throws past
 * its boundary; callers always get a `PollError` they can turn into an
 * `{"error": ...}` payload.
 */
use chrono::Utc;
use log::*;
use uuid::Uuid;

use crate::authorization;
use crate::errors::PollError;
use crate::identity::Identity;
use crate::models::Poll;
use crate::store::PollStore;
use crate::validation;

/**
 * Create a poll owned by the calling identity
 */
pub async fn create_poll(
    store: &dyn PollStore,
    identity: &Identity,
    question: &str,
    options: &[String],
) -> Result<Poll, PollError> {
    let fields = validation::validate_poll_fields(question, options)?;

    let account = identity.account().ok_or(PollError::NotAuthenticated)?;

    let now = Utc::now();
    let poll = Poll {
        id: Uuid::new_v4(),
        question: fields.question,
        options: fields.options,
        created_by: account.id,
        created_at: now,
        updated_at: now,
    };

    store.insert_poll(&poll).await?;
    info!("Poll {} created by {}", poll.id, account.id);
    Ok(poll)
}

/**
 * Overwrite a poll's question and options.
 *
 * Update runs the same validation as create. Once a poll has votes its
 * options are frozen, since recorded votes reference option text; a
 * question-only edit stays possible.
 */
pub async fn update_poll(
    store: &dyn PollStore,
    identity: &Identity,
    poll_id: Uuid,
    question: &str,
    options: &[String],
) -> Result<Poll, PollError> {
    let fields = validation::validate_poll_fields(question, options)?;

    let mut poll = store
        .fetch_poll(poll_id)
        .await?
        .ok_or(PollError::PollNotFound)?;

    if !authorization::can_mutate(identity, &poll) {
        return Err(PollError::NotAuthorized);
    }

    if fields.options != poll.options && store.count_votes(poll_id).await? > 0 {
        return Err(PollError::OptionsLocked);
    }

    poll.question = fields.question;
    poll.options = fields.options;
    poll.updated_at = Utc::now();

    store.update_poll(&poll).await?;
    info!("Poll {} updated", poll.id);
    Ok(poll)
}

/**
 * Delete a poll and, through the store's cascade, its votes
 */
pub async fn delete_poll(
    store: &dyn PollStore,
    identity: &Identity,
    poll_id: Uuid,
) -> Result<(), PollError> {
    let poll = store
        .fetch_poll(poll_id)
        .await?
        .ok_or(PollError::PollNotFound)?;

    if !authorization::can_mutate(identity, &poll) {
        return Err(PollError::NotAuthorized);
    }

    store.delete_poll(poll.id).await?;
    info!("Poll {} deleted", poll.id);
    Ok(())
}

/**
 * Fetch one poll
 */
pub async fn get_poll(store: &dyn PollStore, poll_id: Uuid) -> Result<Poll, PollError> {
    store
        .fetch_poll(poll_id)
        .await?
        .ok_or(PollError::PollNotFound)
}

/**
 * All polls, newest first
 */
pub async fn list_polls(store: &dyn PollStore) -> Result<Vec<Poll>, PollError> {
    Ok(store.recent_polls().await?)
}

/**
 * The calling identity's own polls, newest first
 */
pub async fn polls_for(
    store: &dyn PollStore,
    identity: &Identity,
) -> Result<Vec<Poll>, PollError> {
    let account = identity.account().ok_or(PollError::NotAuthenticated)?;
    Ok(store.polls_created_by(account.id).await?)
}
