use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ThrottleId, Timestamp, UserId};
use crate::domain::throttle::ThrottleRecord;
use crate::ports::ThrottleRepository;

/// In-memory throttle rows. Cloning shares the rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryThrottleRepository {
    rows: Arc<RwLock<Vec<ThrottleRecord>>>,
}

impl InMemoryThrottleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored rows, including expired ones (for testing).
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl ThrottleRepository for InMemoryThrottleRepository {
    async fn insert(&self, record: &ThrottleRecord) -> Result<(), DomainError> {
        self.rows.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<ThrottleRecord>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|r| &r.user_id == user_id).cloned().collect())
    }

    async fn find_active(&self, now: Timestamp) -> Result<Vec<ThrottleRecord>, DomainError> {
        let rows = self.rows.read().await;
        let mut active: Vec<ThrottleRecord> =
            rows.iter().filter(|r| r.is_active(now)).cloned().collect();
        active.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(active)
    }

    async fn delete_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !(&r.user_id == user_id && r.is_active(now)));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_by_id(&self, id: ThrottleId) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        Ok(rows.len() < before)
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<u64, DomainError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| !r.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ModeratorId;
    use crate::domain::throttle::{NewThrottle, PenaltyOrigin, Severity, ThrottleReason};

    fn record(user: &str, hours: Option<u32>, at: Timestamp) -> ThrottleRecord {
        ThrottleRecord::start(
            NewThrottle {
                user_id: UserId::new(user).unwrap(),
                reason: ThrottleReason::Manual,
                severity: Severity::new(2).unwrap(),
                duration_hours: hours,
                origin: PenaltyOrigin::Manual {
                    moderator_id: ModeratorId::new("mod").unwrap(),
                },
                notes: None,
            },
            at,
        )
    }

    #[tokio::test]
    async fn delete_active_leaves_expired_rows_for_pruning() {
        let repo = InMemoryThrottleRepository::new();
        let start = Timestamp::from_unix_secs(0);
        repo.insert(&record("u1", Some(1), start)).await.unwrap();
        repo.insert(&record("u1", None, start)).await.unwrap();
        repo.insert(&record("u2", None, start)).await.unwrap();

        let later = start.plus_hours(2);
        assert_eq!(
            repo.delete_active_for_user(&UserId::new("u1").unwrap(), later)
                .await
                .unwrap(),
            1
        );
        assert_eq!(repo.len().await, 2);
        assert_eq!(repo.delete_expired(later).await.unwrap(), 1);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn find_active_is_newest_first() {
        let repo = InMemoryThrottleRepository::new();
        let old = record("a", None, Timestamp::from_unix_secs(10));
        let new = record("b", None, Timestamp::from_unix_secs(20));
        repo.insert(&old).await.unwrap();
        repo.insert(&new).await.unwrap();

        let active = repo.find_active(Timestamp::from_unix_secs(30)).await.unwrap();
        assert_eq!(active.iter().map(|r| r.id).collect::<Vec<_>>(), vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn delete_by_id_reports_missing() {
        let repo = InMemoryThrottleRepository::new();
        let row = record("a", None, Timestamp::from_unix_secs(0));
        repo.insert(&row).await.unwrap();

        assert!(repo.delete_by_id(row.id).await.unwrap());
        assert!(!repo.delete_by_id(row.id).await.unwrap());
    }
}
