//! ShadowThrottleEngine - progressive visibility penalties.
//!
//! Expiry is lazy: reads filter on `expires_at`, and `prune_expired` is the
//! only thing that physically removes rows.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, ThrottleId, UserId};
use crate::domain::throttle::{
    most_severe_active, visibility_from, EscalationRules, NewThrottle, PenaltyOrigin,
    ThrottlePlan, ThrottleRecord,
};
use crate::ports::{Clock, ThrottleRepository};

/// Per-user summary for the moderation console.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserThrottleStats {
    pub total: usize,
    pub active: usize,
    pub visibility_multiplier: f64,
}

pub struct ShadowThrottleEngine {
    repo: Arc<dyn ThrottleRepository>,
    clock: Arc<dyn Clock>,
    rules: EscalationRules,
}

impl ShadowThrottleEngine {
    pub fn new(repo: Arc<dyn ThrottleRepository>, clock: Arc<dyn Clock>, rules: EscalationRules) -> Self {
        Self { repo, clock, rules }
    }

    pub async fn apply_throttle(&self, new: NewThrottle) -> Result<ThrottleRecord, DomainError> {
        let record = ThrottleRecord::start(new, self.clock.now());
        self.repo.insert(&record).await?;

        tracing::warn!(
            subject = record.user_id.as_str(),
            reason = record.reason.as_str(),
            severity = record.severity.level(),
            automatic = record.origin.is_automatic(),
            moderator = record.origin.moderator().map(|m| m.as_str()),
            "shadow throttle applied"
        );
        Ok(record)
    }

    /// Most severe active throttle, newest first among equals.
    pub async fn get_active_throttle(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ThrottleRecord>, DomainError> {
        let records = self.repo.find_by_user(user_id).await?;
        Ok(most_severe_active(&records, self.clock.now()).cloned())
    }

    /// 1.0 when the user has no active throttle.
    pub async fn visibility_multiplier(&self, user_id: &UserId) -> Result<f64, DomainError> {
        let records = self.repo.find_by_user(user_id).await?;
        Ok(visibility_from(&records, self.clock.now()))
    }

    pub async fn is_throttled(&self, user_id: &UserId) -> Result<bool, DomainError> {
        Ok(self.get_active_throttle(user_id).await?.is_some())
    }

    /// Removes the user's active throttles. Zero is not an error.
    pub async fn remove_throttle(&self, user_id: &UserId) -> Result<u64, DomainError> {
        let removed = self
            .repo
            .delete_active_for_user(user_id, self.clock.now())
            .await?;
        tracing::info!(subject = user_id.as_str(), removed, "shadow throttles removed");
        Ok(removed)
    }

    pub async fn remove_throttle_by_id(&self, id: ThrottleId) -> Result<bool, DomainError> {
        let removed = self.repo.delete_by_id(id).await?;
        tracing::info!(throttle_id = %id, removed, "shadow throttle removed");
        Ok(removed)
    }

    /// Deletes expired rows. Safe to run alongside live traffic.
    pub async fn prune_expired(&self) -> Result<u64, DomainError> {
        let pruned = self.repo.delete_expired(self.clock.now()).await?;
        tracing::info!(pruned, "expired shadow throttles pruned");
        Ok(pruned)
    }

    /// Flag-count escalation. Returns `None` below the lowest tier.
    pub async fn apply_auto_throttle_for_flags(
        &self,
        user_id: &UserId,
        flag_count: u32,
    ) -> Result<Option<ThrottleRecord>, DomainError> {
        match self.rules.for_flags(flag_count) {
            Some(plan) => {
                let notes = format!("{} content flags", flag_count);
                self.apply_plan(user_id, plan, notes).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Spam escalation: severity and duration both grow with volume.
    pub async fn apply_spam_throttle(
        &self,
        user_id: &UserId,
        post_count: u32,
    ) -> Result<ThrottleRecord, DomainError> {
        let plan = self.rules.for_spam(post_count);
        let notes = format!("{} rapid posts", post_count);
        self.apply_plan(user_id, plan, notes).await
    }

    async fn apply_plan(
        &self,
        user_id: &UserId,
        plan: ThrottlePlan,
        notes: String,
    ) -> Result<ThrottleRecord, DomainError> {
        self.apply_throttle(NewThrottle {
            user_id: user_id.clone(),
            reason: plan.reason,
            severity: plan.severity,
            duration_hours: Some(plan.duration_hours),
            origin: PenaltyOrigin::Automatic { rule: plan.rule },
            notes: Some(notes),
        })
        .await
    }

    pub async fn user_stats(&self, user_id: &UserId) -> Result<UserThrottleStats, DomainError> {
        let now = self.clock.now();
        let records = self.repo.find_by_user(user_id).await?;
        Ok(UserThrottleStats {
            total: records.len(),
            active: records.iter().filter(|r| r.is_active(now)).count(),
            visibility_multiplier: visibility_from(&records, now),
        })
    }

    /// Every active throttle, newest first.
    pub async fn list_active(&self) -> Result<Vec<ThrottleRecord>, DomainError> {
        self.repo.find_active(self.clock.now()).await
    }
}
