/**
 * The persistence seam.
 *
 * Everything the engine needs from storage is expressed on the `PollStore`
 * trait as equality-filtered reads and single-row writes. Production uses
 * `PgStore` over the sqlx pool; engine tests run against the in-memory
 * implementation at the bottom of this file, so they need no database.
 */
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Poll, Vote};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    /**
     * The unique index on `votes (poll_id, voted_by)` rejected the insert
     */
    #[error("duplicate vote")]
    Duplicate,

    #[error("{0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            // 23505: PostgreSQL unique_violation
            if db.code().as_deref() == Some("23505") {
                return StoreError::Duplicate;
            }
        }
        StoreError::Database(err.to_string())
    }
}

#[async_trait]
pub trait PollStore: Send + Sync {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError>;

    async fn fetch_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError>;

    /**
     * All polls, newest first
     */
    async fn recent_polls(&self) -> Result<Vec<Poll>, StoreError>;

    /**
     * One creator's polls, newest first
     */
    async fn polls_created_by(&self, owner: Uuid) -> Result<Vec<Poll>, StoreError>;

    async fn update_poll(&self, poll: &Poll) -> Result<(), StoreError>;

    /**
     * Deleting a poll also removes its votes; referential cleanup is the
     * store's contract, not the caller's.
     */
    async fn delete_poll(&self, id: Uuid) -> Result<(), StoreError>;

    async fn find_vote(&self, poll_id: Uuid, voter: Uuid) -> Result<Option<Vote>, StoreError>;

    async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError>;

    async fn votes_for_poll(&self, poll_id: Uuid) -> Result<Vec<Vote>, StoreError>;

    async fn count_votes(&self, poll_id: Uuid) -> Result<i64, StoreError>;
}

/**
 * PostgreSQL-backed store
 */
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO polls (id, question, options, created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(poll.id)
        .bind(&poll.question)
        .bind(&poll.options)
        .bind(poll.created_by)
        .bind(poll.created_at)
        .bind(poll.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"SELECT id, question, options, created_by, created_at, updated_at
               FROM polls WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(poll)
    }

    async fn recent_polls(&self) -> Result<Vec<Poll>, StoreError> {
        let polls = sqlx::query_as::<_, Poll>(
            r#"SELECT id, question, options, created_by, created_at, updated_at
               FROM polls ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(polls)
    }

    async fn polls_created_by(&self, owner: Uuid) -> Result<Vec<Poll>, StoreError> {
        let polls = sqlx::query_as::<_, Poll>(
            r#"SELECT id, question, options, created_by, created_at, updated_at
               FROM polls WHERE created_by = $1 ORDER BY created_at DESC"#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(polls)
    }

    async fn update_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE polls SET question = $2, options = $3, updated_at = $4
               WHERE id = $1"#,
        )
        .bind(poll.id)
        .bind(&poll.question)
        .bind(&poll.options)
        .bind(poll.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_poll(&self, id: Uuid) -> Result<(), StoreError> {
        // votes go with the poll via ON DELETE CASCADE
        sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_vote(&self, poll_id: Uuid, voter: Uuid) -> Result<Option<Vote>, StoreError> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"SELECT poll_id, voted_by, "option", created_at
               FROM votes WHERE poll_id = $1 AND voted_by = $2"#,
        )
        .bind(poll_id)
        .bind(voter)
        .fetch_optional(&self.pool)
        .await?;
        Ok(vote)
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO votes (poll_id, voted_by, "option", created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(vote.poll_id)
        .bind(vote.voted_by)
        .bind(&vote.option)
        .bind(vote.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn votes_for_poll(&self, poll_id: Uuid) -> Result<Vec<Vote>, StoreError> {
        let votes = sqlx::query_as::<_, Vote>(
            r#"SELECT poll_id, voted_by, "option", created_at
               FROM votes WHERE poll_id = $1"#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn count_votes(&self, poll_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
pub mod memory {
    /*
     * In-memory stand-in for the relational store. It mirrors the two store
     * behaviors the engine depends on: the partial unique index on
     * authenticated votes, and the delete cascade from polls to votes.
     */
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        polls: Mutex<HashMap<Uuid, Poll>>,
        votes: Mutex<Vec<Vote>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PollStore for MemoryStore {
        async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
            self.polls.lock().unwrap().insert(poll.id, poll.clone());
            Ok(())
        }

        async fn fetch_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError> {
            Ok(self.polls.lock().unwrap().get(&id).cloned())
        }

        async fn recent_polls(&self) -> Result<Vec<Poll>, StoreError> {
            let mut polls: Vec<Poll> = self.polls.lock().unwrap().values().cloned().collect();
            polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(polls)
        }

        async fn polls_created_by(&self, owner: Uuid) -> Result<Vec<Poll>, StoreError> {
            let mut polls: Vec<Poll> = self
                .polls
                .lock()
                .unwrap()
                .values()
                .filter(|poll| poll.created_by == owner)
                .cloned()
                .collect();
            polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(polls)
        }

        async fn update_poll(&self, poll: &Poll) -> Result<(), StoreError> {
            self.polls.lock().unwrap().insert(poll.id, poll.clone());
            Ok(())
        }

        async fn delete_poll(&self, id: Uuid) -> Result<(), StoreError> {
            self.polls.lock().unwrap().remove(&id);
            self.votes.lock().unwrap().retain(|vote| vote.poll_id != id);
            Ok(())
        }

        async fn find_vote(&self, poll_id: Uuid, voter: Uuid) -> Result<Option<Vote>, StoreError> {
            Ok(self
                .votes
                .lock()
                .unwrap()
                .iter()
                .find(|vote| vote.poll_id == poll_id && vote.voted_by == Some(voter))
                .cloned())
        }

        async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
            let mut votes = self.votes.lock().unwrap();
            if let Some(voter) = vote.voted_by {
                let duplicate = votes
                    .iter()
                    .any(|v| v.poll_id == vote.poll_id && v.voted_by == Some(voter));
                if duplicate {
                    return Err(StoreError::Duplicate);
                }
            }
            votes.push(vote.clone());
            Ok(())
        }

        async fn votes_for_poll(&self, poll_id: Uuid) -> Result<Vec<Vote>, StoreError> {
            Ok(self
                .votes
                .lock()
                .unwrap()
                .iter()
                .filter(|vote| vote.poll_id == poll_id)
                .cloned()
                .collect())
        }

        async fn count_votes(&self, poll_id: Uuid) -> Result<i64, StoreError> {
            Ok(self.votes_for_poll(poll_id).await?.len() as i64)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::Utc;

        fn poll() -> Poll {
            let now = Utc::now();
            Poll {
                id: Uuid::new_v4(),
                question: "Pick a color".to_string(),
                options: vec!["Red".to_string(), "Blue".to_string()],
                created_by: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            }
        }

        #[async_std::test]
        async fn deleting_a_poll_cascades_to_its_votes() {
            let store = MemoryStore::new();
            let poll = poll();
            store.insert_poll(&poll).await.unwrap();
            store
                .insert_vote(&Vote {
                    poll_id: poll.id,
                    voted_by: None,
                    option: "Red".to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();

            store.delete_poll(poll.id).await.unwrap();

            assert!(store.fetch_poll(poll.id).await.unwrap().is_none());
            assert_eq!(store.count_votes(poll.id).await.unwrap(), 0);
        }

        #[async_std::test]
        async fn second_authenticated_vote_hits_the_unique_index() {
            let store = MemoryStore::new();
            let poll = poll();
            let voter = Uuid::new_v4();
            store.insert_poll(&poll).await.unwrap();

            let vote = Vote {
                poll_id: poll.id,
                voted_by: Some(voter),
                option: "Red".to_string(),
                created_at: Utc::now(),
            };
            store.insert_vote(&vote).await.unwrap();

            let again = store.insert_vote(&vote).await;
            assert_eq!(again, Err(StoreError::Duplicate));
        }
    }
}
