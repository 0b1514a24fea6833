//! GetTrustStatsHandler - population overview for the moderation console.

use serde::Serialize;
use std::sync::Arc;

use super::ModerationError;
use crate::application::fingerprint::DeviceFingerprintEngine;
use crate::application::rate_limiter::{RateLimitStats, TokenBucketLimiter};
use crate::domain::fingerprint::DeviceStats;
use crate::domain::foundation::ModeratorId;
use crate::domain::rate_limit::SuspiciousActivity;

#[derive(Debug, Clone)]
pub struct GetTrustStatsQuery {
    pub moderator_id: ModeratorId,
    /// Also assess this rate limit subject for suspicious activity.
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustStats {
    pub rate_limits: RateLimitStats,
    pub devices: DeviceStats,
    pub activity: Option<SuspiciousActivity>,
}

pub struct GetTrustStatsHandler {
    limiter: Arc<TokenBucketLimiter>,
    fingerprints: Arc<DeviceFingerprintEngine>,
}

impl GetTrustStatsHandler {
    pub fn new(limiter: Arc<TokenBucketLimiter>, fingerprints: Arc<DeviceFingerprintEngine>) -> Self {
        Self {
            limiter,
            fingerprints,
        }
    }

    pub async fn handle(&self, query: GetTrustStatsQuery) -> Result<TrustStats, ModerationError> {
        let rate_limits = self.limiter.stats().await?;
        let devices = self.fingerprints.device_stats().await?;
        let activity = match query.subject.as_deref() {
            Some(subject) => Some(self.limiter.detect_suspicious_activity(subject).await?),
            None => None,
        };

        tracing::debug!(
            moderator = query.moderator_id.as_str(),
            buckets = rate_limits.total_buckets,
            devices = devices.total_devices,
            "moderator read trust stats"
        );
        Ok(TrustStats {
            rate_limits,
            devices,
            activity,
        })
    }
}
