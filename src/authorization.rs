/**
 * The single predicate guarding poll mutation.
 */
use crate::identity::{Identity, Role};
use crate::models::Poll;

/**
 * May this caller update or delete this poll?
 *
 * Admins may mutate anything, owners may mutate their own polls, and an
 * anonymous caller may mutate nothing. Callers check this after confirming
 * the poll exists and before issuing any write.
 */
pub fn can_mutate(identity: &Identity, poll: &Poll) -> bool {
    match identity.account() {
        None => false,
        Some(account) => account.role == Role::Admin || account.id == poll.created_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing;
    use chrono::Utc;
    use uuid::Uuid;

    fn poll_owned_by(owner: Uuid) -> Poll {
        let now = Utc::now();
        Poll {
            id: Uuid::new_v4(),
            question: "Pick a color".to_string(),
            options: vec!["Red".to_string(), "Blue".to_string()],
            created_by: owner,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_may_mutate() {
        let owner = Uuid::new_v4();
        assert!(can_mutate(&testing::member(owner), &poll_owned_by(owner)));
    }

    #[test]
    fn admin_may_mutate_any_poll() {
        let admin = testing::admin(Uuid::new_v4());
        assert!(can_mutate(&admin, &poll_owned_by(Uuid::new_v4())));
    }

    #[test]
    fn other_members_may_not_mutate() {
        let other = testing::member(Uuid::new_v4());
        assert!(!can_mutate(&other, &poll_owned_by(Uuid::new_v4())));
    }

    #[test]
    fn anonymous_may_never_mutate() {
        let poll = poll_owned_by(Uuid::new_v4());
        assert!(!can_mutate(&Identity::Anonymous, &poll));
    }
}
