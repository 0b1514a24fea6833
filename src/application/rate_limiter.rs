//! TokenBucketLimiter - per-(subject, action) rate governor.
//!
//! Bucket state lives in the shared store as JSON and is updated through
//! `atomic_update`, so two replicas racing on one bucket cannot both spend
//! the same tokens. Cost mode adds a daily monetary ledger per subject and a
//! service-wide emergency stop.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{
    request_cost, Action, AdaptiveSignals, BucketLimits, BucketState, BucketStatus,
    ConsumeDecision, CostHints, HitHistory, SpendConfig, SpendLedger, SuspiciousActivity,
    HIT_HISTORY_TTL_SECS, MICROS_PER_UNIT,
};
use crate::ports::{atomic_update, Clock, KeyValueStore, StoreError};

/// Why the limiter refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDenial {
    /// Not enough tokens in the bucket.
    Tokens,
    /// The subject's daily monetary ceiling would be passed.
    CostCeiling,
    /// Service-wide daily spend reached the emergency-stop threshold.
    EmergencyStop,
    /// Every compare-and-swap on the subject's state lost to a concurrent
    /// request. Nothing was spent.
    Contended,
}

/// Retry hint for a `Contended` denial.
pub const CONTENTION_RETRY_SECS: f64 = 1.0;

/// Result of `try_consume` / `check`.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitDecision {
    pub allowed: bool,
    /// Tokens left after this call (or available, on denial).
    pub remaining: f64,
    /// Zero when allowed.
    pub retry_after_secs: f64,
    pub denial: Option<LimitDenial>,
    /// Adaptive multiplier applied to capacity and refill for this call.
    pub multiplier: f64,
}

impl LimitDecision {
    fn allowed(remaining: f64, multiplier: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0.0,
            denial: None,
            multiplier,
        }
    }

    fn denied(denial: LimitDenial, remaining: f64, retry_after_secs: f64, multiplier: f64) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after_secs,
            denial: Some(denial),
            multiplier,
        }
    }
}

/// Live bucket counts across every subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub total_buckets: usize,
    pub actions: Vec<ActionBucketStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionBucketStats {
    pub action: Action,
    pub active_buckets: usize,
    pub limits: BucketLimits,
}

pub struct TokenBucketLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn bucket_key(&self, action: Action, subject: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, action, subject)
    }

    fn spend_key(&self, day: &str, subject: &str) -> String {
        format!("{}:cost:{}:{}", self.config.key_prefix, day, subject)
    }

    fn spend_total_key(&self, day: &str) -> String {
        format!("{}:cost:{}:_total", self.config.key_prefix, day)
    }

    fn hits_key(&self, subject: &str) -> String {
        format!("{}:hits:{}", self.config.key_prefix, subject)
    }

    fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.config.idle_ttl_secs)
    }

    /// Plain token-bucket contract: default cost unless overridden, no
    /// adaptive signals.
    pub async fn try_consume(
        &self,
        subject: &str,
        action: Action,
        cost_override: Option<f64>,
    ) -> Result<LimitDecision, StoreError> {
        let hints = CostHints {
            cost_override,
            ..CostHints::default()
        };
        self.check(subject, action, &hints, &AdaptiveSignals::default())
            .await
    }

    /// Full check: context-dependent cost, adaptive scaling and, when
    /// enabled, the daily spend ledger.
    pub async fn check(
        &self,
        subject: &str,
        action: Action,
        hints: &CostHints,
        signals: &AdaptiveSignals,
    ) -> Result<LimitDecision, StoreError> {
        let now = self.clock.now();
        let base = self.config.limits(action);
        let multiplier = self.config.adaptive.multiplier(signals);
        let limits = base.scaled(multiplier);
        let cost = request_cost(action, base, hints);

        let spend = &self.config.spend;
        let charge_micros = SpendConfig::to_micros(hints.monetary_cost.unwrap_or(base.monetary_cost));
        let reservation = if spend.enabled && charge_micros > 0 {
            match self.reserve_spend(subject, charge_micros, now).await? {
                Ok(reservation) => Some(reservation),
                Err(LimitDenial::Contended) => {
                    tracing::warn!(subject, action = %action, "spend ledger update contended");
                    return Ok(LimitDecision::denied(
                        LimitDenial::Contended,
                        0.0,
                        CONTENTION_RETRY_SECS,
                        multiplier,
                    ));
                }
                Err(denial) => {
                    let retry = now.secs_until_end_of_day() as f64;
                    tracing::debug!(
                        subject,
                        action = %action,
                        reason = ?denial,
                        retry_after = retry,
                        "spend limit denied request"
                    );
                    return Ok(LimitDecision::denied(denial, 0.0, retry, multiplier));
                }
            }
        } else {
            None
        };

        let key = self.bucket_key(action, subject);
        let consumed = atomic_update(
            self.store.as_ref(),
            &key,
            Some(self.idle_ttl()),
            self.config.max_cas_attempts,
            |current| {
                let state = match current.map(serde_json::from_str::<BucketState>) {
                    Some(Ok(state)) => state,
                    Some(Err(e)) => {
                        tracing::warn!(key = %key, error = %e, "discarding unreadable bucket state");
                        BucketState::fresh(&limits, now)
                    }
                    None => BucketState::fresh(&limits, now),
                };
                match state.consume(&limits, cost, now) {
                    ConsumeDecision::Admitted { next, remaining } => {
                        let encoded = serde_json::to_string(&next)
                            .map_err(|e| StoreError::corrupt(key.as_str(), e.to_string()))?;
                        Ok((Some(encoded), ConsumeDecision::Admitted { next, remaining }))
                    }
                    denied => Ok((None, denied)),
                }
            },
        )
        .await;

        let decision = match consumed {
            Ok(decision) => decision,
            Err(StoreError::Contention { attempts, .. }) => {
                if let Some(reservation) = &reservation {
                    self.refund_spend(reservation).await;
                }
                tracing::warn!(subject, action = %action, attempts, "bucket update contended");
                return Ok(LimitDecision::denied(
                    LimitDenial::Contended,
                    0.0,
                    CONTENTION_RETRY_SECS,
                    multiplier,
                ));
            }
            Err(e) => {
                if let Some(reservation) = &reservation {
                    self.refund_spend(reservation).await;
                }
                return Err(e);
            }
        };

        match decision {
            ConsumeDecision::Admitted { remaining, .. } => {
                if let Some(reservation) = &reservation {
                    self.record_global_spend(reservation, now).await?;
                }
                tracing::debug!(subject, action = %action, remaining, cost, "tokens consumed");
                Ok(LimitDecision::allowed(remaining, multiplier))
            }
            ConsumeDecision::Denied {
                available,
                retry_after_secs,
            } => {
                if let Some(reservation) = &reservation {
                    self.refund_spend(reservation).await;
                }
                tracing::debug!(
                    subject,
                    action = %action,
                    retry_after = retry_after_secs,
                    available,
                    cost,
                    "rate limit exceeded"
                );
                self.record_hit(subject, now).await;
                Ok(LimitDecision::denied(
                    LimitDenial::Tokens,
                    available,
                    retry_after_secs,
                    multiplier,
                ))
            }
        }
    }

    /// Non-consuming view of a bucket.
    pub async fn status(
        &self,
        subject: &str,
        action: Action,
        signals: &AdaptiveSignals,
    ) -> Result<BucketStatus, StoreError> {
        let now = self.clock.now();
        let limits = self
            .config
            .limits(action)
            .scaled(self.config.adaptive.multiplier(signals));
        let key = self.bucket_key(action, subject);

        let state = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str::<BucketState>(&raw)
                .unwrap_or_else(|_| BucketState::fresh(&limits, now)),
            None => BucketState::fresh(&limits, now),
        };
        Ok(state.status(&limits, now))
    }

    /// Flags a subject whose buckets are exhausted across many actions or
    /// who keeps hitting limits in quick succession.
    pub async fn detect_suspicious_activity(
        &self,
        subject: &str,
    ) -> Result<SuspiciousActivity, StoreError> {
        let now = self.clock.now();
        let mut limited = Vec::new();
        for action in Action::ALL {
            let Some(raw) = self.store.get(&self.bucket_key(action, subject)).await? else {
                continue;
            };
            let Ok(state) = serde_json::from_str::<BucketState>(&raw) else {
                continue;
            };
            let limits = self.config.limits(action);
            if state.refilled(limits, now).tokens < limits.cost_per_request {
                limited.push(action);
            }
        }

        let key = self.hits_key(subject);
        let history = HitHistory::parse(self.store.get(&key).await?.as_deref())
            .ok_or_else(|| StoreError::corrupt(key.as_str(), "hit history is not a JSON list"))?;

        let activity = SuspiciousActivity::assess(limited, &history);
        if activity.suspicious {
            tracing::info!(subject, reasons = ?activity.reasons, "suspicious rate limit activity");
        }
        Ok(activity)
    }

    /// Counts live buckets per action.
    pub async fn stats(&self) -> Result<RateLimitStats, StoreError> {
        let mut actions = Vec::with_capacity(Action::ALL.len());
        for action in Action::ALL {
            let prefix = format!("{}:{}:", self.config.key_prefix, action);
            let active_buckets = self.store.scan_prefix(&prefix).await?.len();
            actions.push(ActionBucketStats {
                action,
                active_buckets,
                limits: self.config.limits(action).clone(),
            });
        }
        Ok(RateLimitStats {
            total_buckets: actions.iter().map(|a| a.active_buckets).sum(),
            actions,
        })
    }

    /// Restores a bucket to full (admin operation). Returns true if state existed.
    pub async fn reset(&self, subject: &str, action: Action) -> Result<bool, StoreError> {
        let removed = self.store.delete(&self.bucket_key(action, subject)).await?;
        tracing::info!(subject, action = %action, removed, "rate limit bucket reset");
        Ok(removed)
    }

    /// Subject's spend so far today, in currency units.
    pub async fn spent_today(&self, subject: &str) -> Result<f64, StoreError> {
        let key = self.spend_key(&self.clock.now().day_stamp(), subject);
        let raw = self.store.get(&key).await?;
        let ledger = SpendLedger::parse(raw.as_deref())
            .ok_or_else(|| StoreError::corrupt(key.as_str(), "spend ledger is not an integer"))?;
        Ok(ledger.spent_micros as f64 / MICROS_PER_UNIT as f64)
    }

    /// Best effort: a lost update only shortens the subject's denial history.
    async fn record_hit(&self, subject: &str, now: Timestamp) {
        let key = self.hits_key(subject);
        let result = atomic_update(
            self.store.as_ref(),
            &key,
            Some(Duration::from_secs(HIT_HISTORY_TTL_SECS)),
            self.config.max_cas_attempts,
            |current| {
                let history = HitHistory::parse(current).unwrap_or_default();
                Ok((Some(history.record(now).encode()), ()))
            },
        )
        .await;
        if let Err(e) = result {
            tracing::warn!(subject, error = %e, "failed to record rate limit hit");
        }
    }

    async fn reserve_spend(
        &self,
        subject: &str,
        amount_micros: i64,
        now: Timestamp,
    ) -> Result<Result<SpendReservation, LimitDenial>, StoreError> {
        let spend = &self.config.spend;
        let day = now.day_stamp();

        let total_key = self.spend_total_key(&day);
        let total = SpendLedger::parse(self.store.get(&total_key).await?.as_deref())
            .ok_or_else(|| StoreError::corrupt(total_key.as_str(), "spend total is not an integer"))?;
        if spend.is_emergency_stopped(total.spent_micros) {
            return Ok(Err(LimitDenial::EmergencyStop));
        }

        let key = self.spend_key(&day, subject);
        let ttl = spend_ttl(now);
        let limit = spend.daily_limit_micros();
        let charged = match atomic_update(
            self.store.as_ref(),
            &key,
            Some(ttl),
            self.config.max_cas_attempts,
            |current| {
                let ledger = SpendLedger::parse(current)
                    .ok_or_else(|| StoreError::corrupt(key.as_str(), "spend ledger is not an integer"))?;
                Ok(match ledger.charge(amount_micros, limit) {
                    Some(next) => (Some(next.encode()), true),
                    None => (None, false),
                })
            },
        )
        .await
        {
            Ok(charged) => charged,
            Err(StoreError::Contention { .. }) => return Ok(Err(LimitDenial::Contended)),
            Err(e) => return Err(e),
        };

        if !charged {
            return Ok(Err(LimitDenial::CostCeiling));
        }
        Ok(Ok(SpendReservation {
            key,
            day,
            amount_micros,
        }))
    }

    /// Best effort: a failed refund leaves the subject slightly over-charged.
    async fn refund_spend(&self, reservation: &SpendReservation) {
        let result = atomic_update(
            self.store.as_ref(),
            &reservation.key,
            Some(spend_ttl(self.clock.now())),
            self.config.max_cas_attempts,
            |current| {
                let ledger = SpendLedger::parse(current).unwrap_or_default();
                Ok((Some(ledger.refund(reservation.amount_micros).encode()), ()))
            },
        )
        .await;
        if let Err(e) = result {
            tracing::error!(key = %reservation.key, error = %e, "failed to refund reserved spend");
        }
    }

    async fn record_global_spend(
        &self,
        reservation: &SpendReservation,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        self.store
            .increment(
                &self.spend_total_key(&reservation.day),
                reservation.amount_micros,
                spend_ttl(now),
            )
            .await?;
        Ok(())
    }
}

struct SpendReservation {
    key: String,
    day: String,
    amount_micros: i64,
}

/// Daily ledgers outlive their day by an hour.
fn spend_ttl(now: Timestamp) -> Duration {
    Duration::from_secs(now.secs_until_end_of_day() + 3600)
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::store::InMemoryKeyValueStore;
    use crate::domain::rate_limit::{ActivityFlag, BucketLimits};

    fn limiter_with(config: RateLimitConfig) -> (TokenBucketLimiter, Arc<ManualClock>, InMemoryKeyValueStore) {
        let clock = Arc::new(ManualClock::fixed());
        let store = InMemoryKeyValueStore::with_clock(clock.clone());
        let limiter = TokenBucketLimiter::new(Arc::new(store.clone()), clock.clone(), config);
        (limiter, clock, store)
    }

    fn ten_per_second() -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        *config.actions.get_mut(Action::Message) = BucketLimits::new(10.0, 1.0, 1.0, 0.0);
        config
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Token bucket
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn ten_calls_then_denial_then_one_more_after_a_second() {
        let (limiter, clock, _) = limiter_with(ten_per_second());

        for _ in 0..10 {
            assert!(limiter.try_consume("u1", Action::Message, None).await.unwrap().allowed);
        }

        let denied = limiter.try_consume("u1", Action::Message, None).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.denial, Some(LimitDenial::Tokens));
        assert!((denied.retry_after_secs - 1.0).abs() < 1e-6);

        clock.advance_secs(1);
        assert!(limiter.try_consume("u1", Action::Message, None).await.unwrap().allowed);
        assert!(!limiter.try_consume("u1", Action::Message, None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn subjects_and_actions_have_separate_buckets() {
        let (limiter, _, _) = limiter_with(ten_per_second());

        for _ in 0..10 {
            limiter.try_consume("u1", Action::Message, None).await.unwrap();
        }
        assert!(!limiter.try_consume("u1", Action::Message, None).await.unwrap().allowed);
        assert!(limiter.try_consume("u2", Action::Message, None).await.unwrap().allowed);
        assert!(limiter.try_consume("u1", Action::BulletinPost, None).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn cost_override_spends_that_many_tokens() {
        let (limiter, _, _) = limiter_with(ten_per_second());

        let decision = limiter.try_consume("u1", Action::Message, Some(4.0)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 6.0);
    }

    #[tokio::test]
    async fn large_photo_costs_three_tokens() {
        let (limiter, _, _) = limiter_with(RateLimitConfig::default());
        let hints = CostHints {
            file_size_bytes: Some(8 * 1024 * 1024),
            ..CostHints::default()
        };

        let decision = limiter
            .check("u1", Action::PhotoUpload, &hints, &AdaptiveSignals::default())
            .await
            .unwrap();
        assert_eq!(decision.remaining, 12.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_never_overspend() {
        let (limiter, _, _) = limiter_with(ten_per_second());
        let limiter = Arc::new(limiter);

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.try_consume("u1", Action::Message, None).await
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            let decision = task.await.unwrap().unwrap();
            if decision.allowed {
                admitted += 1;
            } else {
                assert!(matches!(
                    decision.denial,
                    Some(LimitDenial::Tokens) | Some(LimitDenial::Contended)
                ));
            }
        }
        assert!(admitted <= 10, "admitted {}", admitted);

        let status = limiter
            .status("u1", Action::Message, &AdaptiveSignals::default())
            .await
            .unwrap();
        assert_eq!(status.tokens, 10.0 - admitted as f64);
    }

    /// Loses every compare-and-swap, as if another replica always won.
    struct ContendedStore(InMemoryKeyValueStore);

    #[async_trait::async_trait]
    impl KeyValueStore for ContendedStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
            self.0.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.0.delete(key).await
        }
        async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64, StoreError> {
            self.0.increment(key, delta, ttl).await
        }
        async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
            self.0.ttl(key).await
        }
        async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StoreError> {
            self.0.set_add(key, member, ttl).await
        }
        async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.0.set_members(key).await
        }
        async fn set_card(&self, key: &str) -> Result<usize, StoreError> {
            self.0.set_card(key).await
        }
        async fn compare_and_swap(
            &self,
            _: &str,
            _: Option<&str>,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.0.scan_prefix(prefix).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lost_swaps_deny_instead_of_admitting_for_free() {
        let clock = Arc::new(ManualClock::fixed());
        let store = ContendedStore(InMemoryKeyValueStore::with_clock(clock.clone()));
        let limiter = TokenBucketLimiter::new(Arc::new(store), clock, ten_per_second());

        for _ in 0..20 {
            let decision = limiter.try_consume("u1", Action::Message, None).await.unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.denial, Some(LimitDenial::Contended));
            assert_eq!(decision.retry_after_secs, CONTENTION_RETRY_SECS);
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Activity and stats
    // ════════════════════════════════════════════════════════════════════════════

    fn one_token_everywhere() -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        for action in Action::ALL {
            *config.actions.get_mut(action) = BucketLimits::new(1.0, 0.01, 1.0, 0.0);
        }
        config
    }

    #[tokio::test]
    async fn exhausting_four_actions_is_suspicious() {
        let (limiter, _, _) = limiter_with(one_token_everywhere());

        for action in &Action::ALL[..3] {
            limiter.try_consume("u1", *action, None).await.unwrap();
        }
        let activity = limiter.detect_suspicious_activity("u1").await.unwrap();
        assert!(!activity.suspicious);
        assert_eq!(activity.limited_actions, Action::ALL[..3].to_vec());

        limiter.try_consume("u1", Action::ALL[3], None).await.unwrap();
        let activity = limiter.detect_suspicious_activity("u1").await.unwrap();
        assert!(activity.suspicious);
        assert_eq!(activity.reasons, vec![ActivityFlag::ManyActionsLimited]);

        assert!(!limiter.detect_suspicious_activity("u2").await.unwrap().suspicious);
    }

    #[tokio::test]
    async fn rapid_denials_are_suspicious_until_the_history_expires() {
        let (limiter, clock, _) = limiter_with(ten_per_second());
        limiter.try_consume("u1", Action::Message, Some(10.0)).await.unwrap();

        for _ in 0..10 {
            let denied = limiter.try_consume("u1", Action::Message, Some(10.0)).await.unwrap();
            assert_eq!(denied.denial, Some(LimitDenial::Tokens));
        }
        let activity = limiter.detect_suspicious_activity("u1").await.unwrap();
        assert_eq!(activity.reasons, vec![ActivityFlag::RapidLimitHits]);

        clock.advance_secs(HIT_HISTORY_TTL_SECS);
        assert!(!limiter.detect_suspicious_activity("u1").await.unwrap().suspicious);
    }

    #[tokio::test]
    async fn stats_count_live_buckets_per_action() {
        let (limiter, clock, store) = limiter_with(costed());
        limiter.try_consume("u1", Action::Message, None).await.unwrap();
        limiter.try_consume("u2", Action::Message, None).await.unwrap();
        limiter.try_consume("u1", Action::Login, None).await.unwrap();
        store.set("rate_limit:cost:2024-01-01:u1", "5", None).await.unwrap();

        let stats = limiter.stats().await.unwrap();
        assert_eq!(stats.total_buckets, 3);
        let count = |action| {
            stats
                .actions
                .iter()
                .find(|a| a.action == action)
                .map(|a| a.active_buckets)
        };
        assert_eq!(count(Action::Message), Some(2));
        assert_eq!(count(Action::Login), Some(1));
        assert_eq!(count(Action::PhotoUpload), Some(0));

        clock.advance_secs(limiter.config().idle_ttl_secs);
        assert_eq!(limiter.stats().await.unwrap().total_buckets, 0);
    }

    #[tokio::test]
    async fn status_does_not_consume_and_reset_refills() {
        let (limiter, _, _) = limiter_with(ten_per_second());
        limiter.try_consume("u1", Action::Message, Some(6.0)).await.unwrap();

        let status = limiter
            .status("u1", Action::Message, &AdaptiveSignals::default())
            .await
            .unwrap();
        assert_eq!(status.tokens, 4.0);
        assert_eq!(status.percentage_used, 60.0);

        assert!(limiter.reset("u1", Action::Message).await.unwrap());
        let status = limiter
            .status("u1", Action::Message, &AdaptiveSignals::default())
            .await
            .unwrap();
        assert_eq!(status.tokens, 10.0);
    }

    #[tokio::test]
    async fn corrupt_bucket_is_reinitialised() {
        let (limiter, _, store) = limiter_with(ten_per_second());
        store.set("rate_limit:message:u1", "not json", None).await.unwrap();

        let decision = limiter.try_consume("u1", Action::Message, None).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9.0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Adaptive mode
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn trusted_subject_gets_a_larger_bucket() {
        let mut config = ten_per_second();
        config.adaptive.enabled = true;
        let (limiter, _, _) = limiter_with(config);

        let trusted = AdaptiveSignals {
            trust: Some(1.0),
            load: Some(0.0),
            behavior: Some(1.0),
        };
        let hints = CostHints::default();
        let mut admitted = 0;
        for _ in 0..25 {
            if limiter.check("u1", Action::Message, &hints, &trusted).await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    #[tokio::test]
    async fn distrust_shrinks_an_existing_bucket_immediately() {
        let mut config = ten_per_second();
        config.adaptive.enabled = true;
        let (limiter, _, _) = limiter_with(config);
        let hints = CostHints::default();

        limiter
            .check("u1", Action::Message, &hints, &AdaptiveSignals::default())
            .await
            .unwrap();

        let distrusted = AdaptiveSignals {
            trust: Some(0.0),
            load: Some(1.0),
            behavior: Some(0.0),
        };
        let decision = limiter.check("u1", Action::Message, &hints, &distrusted).await.unwrap();
        assert_eq!(decision.multiplier, 0.5);
        assert_eq!(decision.remaining, 4.0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Cost mode
    // ════════════════════════════════════════════════════════════════════════════

    fn costed() -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        config.spend.enabled = true;
        config.spend.daily_limit = 0.01;
        config.spend.emergency_stop_threshold = 1.0;
        config
    }

    fn priced(amount: f64) -> CostHints {
        CostHints {
            monetary_cost: Some(amount),
            ..CostHints::default()
        }
    }

    #[tokio::test]
    async fn daily_ceiling_denies_regardless_of_tokens() {
        let (limiter, clock, _) = limiter_with(costed());
        let signals = AdaptiveSignals::default();

        for _ in 0..5 {
            let d = limiter
                .check("u1", Action::ContentGeneration, &priced(0.002), &signals)
                .await
                .unwrap();
            assert!(d.allowed);
        }
        let denied = limiter
            .check("u1", Action::ContentGeneration, &priced(0.002), &signals)
            .await
            .unwrap();
        assert_eq!(denied.denial, Some(LimitDenial::CostCeiling));
        assert_eq!(
            denied.retry_after_secs,
            clock.now().secs_until_end_of_day() as f64
        );
        assert!((limiter.spent_today("u1").await.unwrap() - 0.01).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bucket_denial_refunds_the_reservation() {
        let (limiter, _, _) = limiter_with(costed());
        let signals = AdaptiveSignals::default();

        limiter
            .check("u1", Action::Login, &CostHints { cost_override: Some(5.0), ..priced(0.001) }, &signals)
            .await
            .unwrap();
        let denied = limiter
            .check("u1", Action::Login, &priced(0.001), &signals)
            .await
            .unwrap();
        assert_eq!(denied.denial, Some(LimitDenial::Tokens));
        assert!((limiter.spent_today("u1").await.unwrap() - 0.001).abs() < 1e-9);
    }

    #[tokio::test]
    async fn emergency_stop_blocks_every_subject() {
        let mut config = costed();
        config.spend.daily_limit = 10.0;
        config.spend.emergency_stop_threshold = 0.005;
        let (limiter, _, _) = limiter_with(config);
        let signals = AdaptiveSignals::default();

        for subject in ["a", "b"] {
            let d = limiter
                .check(subject, Action::ContentGeneration, &priced(0.0025), &signals)
                .await
                .unwrap();
            assert!(d.allowed);
        }
        let stopped = limiter
            .check("c", Action::ContentGeneration, &priced(0.0025), &signals)
            .await
            .unwrap();
        assert_eq!(stopped.denial, Some(LimitDenial::EmergencyStop));
    }

    #[tokio::test]
    async fn free_actions_skip_the_ledger() {
        let (limiter, _, store) = limiter_with(costed());
        limiter.try_consume("u1", Action::Message, None).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
