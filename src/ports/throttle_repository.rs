//! Shadow throttle persistence port.
//!
//! Rows are never updated in place: a throttle is inserted, then either
//! deleted explicitly or left to expire and be pruned.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ThrottleId, Timestamp, UserId};
use crate::domain::throttle::ThrottleRecord;

#[async_trait]
pub trait ThrottleRepository: Send + Sync {
    async fn insert(&self, record: &ThrottleRecord) -> Result<(), DomainError>;

    /// Every row for the user, active or not.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<ThrottleRecord>, DomainError>;

    /// Rows active at `now` across all users, newest first.
    async fn find_active(&self, now: Timestamp) -> Result<Vec<ThrottleRecord>, DomainError>;

    /// Deletes the user's rows active at `now`. Returns the count removed.
    async fn delete_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<u64, DomainError>;

    /// Returns false when no row had that id.
    async fn delete_by_id(&self, id: ThrottleId) -> Result<bool, DomainError>;

    /// Deletes rows whose `expires_at` is at or before `now`.
    async fn delete_expired(&self, now: Timestamp) -> Result<u64, DomainError>;
}
