/**
 * The vote engine: one identity, one vote.
 */
use log::*;
use uuid::Uuid;

use crate::errors::PollError;
use crate::identity::Identity;
use crate::models::Vote;
use crate::store::PollStore;

/**
 * Who is allowed to cast votes, fixed at startup from the environment
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VotePolicy {
    /**
     * Anybody may vote, signed in or not
     */
    Open,
    /**
     * Only authenticated callers may vote
     */
    AuthenticatedOnly,
}

/**
 * Record a vote on `poll_id` for the option at `option_index`.
 *
 * The index is checked against the poll as currently stored and refused
 * outright when out of range, never clamped. Authenticated voters are held
 * to one vote per poll: a friendly pre-check catches the common case and
 * the store's unique index settles any race the pre-check misses. Anonymous
 * votes carry no voter id and are deliberately not deduplicated.
 */
pub async fn cast_vote(
    store: &dyn PollStore,
    policy: VotePolicy,
    identity: &Identity,
    poll_id: Uuid,
    option_index: i64,
) -> Result<(), PollError> {
    let poll = store
        .fetch_poll(poll_id)
        .await?
        .ok_or(PollError::PollNotFound)?;

    if identity.is_anonymous() && policy == VotePolicy::AuthenticatedOnly {
        return Err(PollError::NotAuthenticated);
    }

    if option_index < 0 || option_index >= poll.options.len() as i64 {
        return Err(PollError::InvalidOption);
    }

    let option = poll.options[option_index as usize].clone();

    match identity.account() {
        Some(account) => {
            if store.find_vote(poll_id, account.id).await?.is_some() {
                return Err(PollError::DuplicateVote);
            }
        }
        None => {
            debug!("Recording anonymous vote on poll {}", poll_id);
        }
    }

    let vote = Vote {
        poll_id,
        voted_by: identity.account().map(|account| account.id),
        option,
        created_at: chrono::Utc::now(),
    };

    store.insert_vote(&vote).await?;
    info!("Vote recorded on poll {}", poll_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing;
    use crate::models::Poll;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    async fn seeded_store() -> (MemoryStore, Poll) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let poll = Poll {
            id: Uuid::new_v4(),
            question: "Pick a color".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        store.insert_poll(&poll).await.unwrap();
        (store, poll)
    }

    #[async_std::test]
    async fn vote_on_missing_poll_is_refused() {
        let store = MemoryStore::new();
        let voter = testing::member(Uuid::new_v4());

        let result = cast_vote(&store, VotePolicy::Open, &voter, Uuid::new_v4(), 0).await;
        assert_eq!(result, Err(PollError::PollNotFound));
    }

    #[async_std::test]
    async fn out_of_range_indexes_are_refused() {
        let (store, poll) = seeded_store().await;
        let voter = testing::member(Uuid::new_v4());

        // one past the end and negative, both refused rather than clamped
        let past = cast_vote(&store, VotePolicy::Open, &voter, poll.id, 2).await;
        assert_eq!(past, Err(PollError::InvalidOption));

        let negative = cast_vote(&store, VotePolicy::Open, &voter, poll.id, -1).await;
        assert_eq!(negative, Err(PollError::InvalidOption));

        assert_eq!(store.count_votes(poll.id).await.unwrap(), 0);
    }

    #[async_std::test]
    async fn second_vote_from_the_same_identity_is_refused() {
        let (store, poll) = seeded_store().await;
        let voter = testing::member(Uuid::new_v4());

        cast_vote(&store, VotePolicy::Open, &voter, poll.id, 0)
            .await
            .expect("first vote");

        let again = cast_vote(&store, VotePolicy::Open, &voter, poll.id, 1).await;
        assert_eq!(again, Err(PollError::DuplicateVote));

        // the first vote's option is untouched
        let votes = store.votes_for_poll(poll.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].option, "Red");
    }

    #[async_std::test]
    async fn different_identities_each_get_a_vote() {
        let (store, poll) = seeded_store().await;

        cast_vote(
            &store,
            VotePolicy::Open,
            &testing::member(Uuid::new_v4()),
            poll.id,
            0,
        )
        .await
        .unwrap();
        cast_vote(
            &store,
            VotePolicy::Open,
            &testing::member(Uuid::new_v4()),
            poll.id,
            1,
        )
        .await
        .unwrap();

        assert_eq!(store.count_votes(poll.id).await.unwrap(), 2);
    }

    #[async_std::test]
    async fn anonymous_votes_are_not_deduplicated() {
        let (store, poll) = seeded_store().await;

        cast_vote(&store, VotePolicy::Open, &Identity::Anonymous, poll.id, 0)
            .await
            .unwrap();
        cast_vote(&store, VotePolicy::Open, &Identity::Anonymous, poll.id, 0)
            .await
            .unwrap();

        assert_eq!(store.count_votes(poll.id).await.unwrap(), 2);
    }

    #[async_std::test]
    async fn authenticated_only_policy_refuses_anonymous_votes() {
        let (store, poll) = seeded_store().await;

        let result = cast_vote(
            &store,
            VotePolicy::AuthenticatedOnly,
            &Identity::Anonymous,
            poll.id,
            0,
        )
        .await;

        assert_eq!(result, Err(PollError::NotAuthenticated));
        assert_eq!(store.count_votes(poll.id).await.unwrap(), 0);
    }

    #[async_std::test]
    async fn the_vote_stores_the_option_text() {
        let (store, poll) = seeded_store().await;
        let voter = testing::member(Uuid::new_v4());

        cast_vote(&store, VotePolicy::Open, &voter, poll.id, 1)
            .await
            .unwrap();

        let votes = store.votes_for_poll(poll.id).await.unwrap();
        assert_eq!(votes[0].option, "Blue");
    }
}
