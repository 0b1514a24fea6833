//! AdmissionOrchestrator - the one entry point domain code calls.
//!
//! Stages, stopping at the first denial:
//! 1. device block check
//! 2. device evaluation, auto-blocking risky devices
//! 3. token bucket (and spend ledger)
//! 4. visibility lookup
//! 5. device/user association
//!
//! A transient store failure in stages 1-3 is resolved by the action's
//! `FailurePolicy`. Contention and corrupt state always deny.
//! Stages 4 and 5 never deny.

use std::sync::Arc;

use super::fingerprint::DeviceFingerprintEngine;
use super::rate_limiter::{LimitDecision, LimitDenial, TokenBucketLimiter, CONTENTION_RETRY_SECS};
use super::throttle::ShadowThrottleEngine;
use crate::config::AdmissionConfig;
use crate::domain::admission::{
    anonymous_subject, DenialReason, FailurePolicy, RequestContext, Verdict,
    ANONYMOUS_SUBJECT_PREFIX,
};
use crate::domain::fingerprint::FingerprintHash;
use crate::domain::foundation::{DomainError, UserId};
use crate::domain::rate_limit::Action;
use crate::domain::throttle::{ThrottleRecord, FULL_VISIBILITY};
use crate::ports::StoreError;

pub struct AdmissionOrchestrator {
    fingerprints: Arc<DeviceFingerprintEngine>,
    limiter: Arc<TokenBucketLimiter>,
    throttles: Arc<ShadowThrottleEngine>,
    config: AdmissionConfig,
}

impl AdmissionOrchestrator {
    pub fn new(
        fingerprints: Arc<DeviceFingerprintEngine>,
        limiter: Arc<TokenBucketLimiter>,
        throttles: Arc<ShadowThrottleEngine>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            fingerprints,
            limiter,
            throttles,
            config,
        }
    }

    pub fn fingerprints(&self) -> &Arc<DeviceFingerprintEngine> {
        &self.fingerprints
    }

    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    pub fn throttles(&self) -> &Arc<ShadowThrottleEngine> {
        &self.throttles
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Runs the full pipeline for `subject`. Never fails: store trouble is
    /// folded into the verdict.
    pub async fn admit(&self, subject: &str, action: Action, ctx: &RequestContext) -> Verdict {
        let fingerprint = self.fingerprints.fingerprint(ctx);
        let user = account_of(subject);

        let verdict = match self.screen(subject, action, ctx, &fingerprint).await {
            Ok(Some(denied)) => return denied,
            Ok(None) => {
                let visibility = self.visibility(user.as_ref()).await;
                if let Some(user) = &user {
                    if let Err(e) = self.fingerprints.associate(&fingerprint, user).await {
                        tracing::error!(
                            subject,
                            fingerprint = fingerprint.short(),
                            error = %e,
                            "failed to associate device with user"
                        );
                    }
                }
                Verdict::allow(visibility, Some(fingerprint))
            }
            Err(e) if !e.is_transient() => {
                tracing::error!(
                    subject,
                    action = %action,
                    fingerprint = fingerprint.short(),
                    error = %e,
                    "admission state unusable"
                );
                return unusable_state_verdict(&e, fingerprint);
            }
            Err(e) => {
                let policy = self.config.failure_policy(action);
                tracing::error!(
                    subject,
                    action = %action,
                    fingerprint = fingerprint.short(),
                    policy = ?policy,
                    error = %e,
                    "store failure during admission"
                );
                match policy {
                    FailurePolicy::Open => {
                        let mut verdict = Verdict::degraded(Some(fingerprint));
                        verdict.visibility_multiplier = self.visibility(user.as_ref()).await;
                        verdict
                    }
                    FailurePolicy::Closed => {
                        return Verdict::deny(DenialReason::StoreUnavailable, Some(fingerprint))
                            .with_message("admission state is temporarily unavailable");
                    }
                }
            }
        };

        tracing::debug!(
            subject,
            action = %action,
            visibility = verdict.visibility_multiplier,
            degraded = verdict.degraded,
            "request admitted"
        );
        verdict
    }

    /// Admits a caller without an account, keyed by its device.
    pub async fn admit_anonymous(&self, action: Action, ctx: &RequestContext) -> Verdict {
        let subject = anonymous_subject(&self.fingerprints.fingerprint(ctx));
        self.admit(&subject, action, ctx).await
    }

    /// Stages 1-3. `Ok(Some(_))` is a denial.
    async fn screen(
        &self,
        subject: &str,
        action: Action,
        ctx: &RequestContext,
        fingerprint: &FingerprintHash,
    ) -> Result<Option<Verdict>, StoreError> {
        let block = self.fingerprints.is_blocked(fingerprint).await?;
        if block.blocked {
            let reason = block.reason.unwrap_or_else(|| "device blocked".to_string());
            tracing::warn!(
                subject,
                action = %action,
                fingerprint = fingerprint.short(),
                reason = %reason,
                "blocked device refused"
            );
            return Ok(Some(
                Verdict::deny(DenialReason::DeviceBlocked, Some(fingerprint.clone()))
                    .with_message(reason),
            ));
        }

        let evaluation = self.fingerprints.evaluate(fingerprint, &ctx.headers).await?;
        let adaptive = self.limiter.config().adaptive.enabled;
        let risk = if evaluation.suspicious || adaptive {
            Some(self.fingerprints.risk_score(fingerprint).await?)
        } else {
            None
        };

        if let Some(score) = risk.filter(|_| evaluation.suspicious) {
            if score >= self.config.auto_block_threshold {
                let reason = evaluation.summary();
                self.fingerprints
                    .block(
                        fingerprint,
                        &reason,
                        self.fingerprints.config().device_block_duration(),
                    )
                    .await?;
                tracing::warn!(
                    subject,
                    action = %action,
                    fingerprint = fingerprint.short(),
                    score,
                    reason = %reason,
                    "risky device auto-blocked"
                );
                return Ok(Some(
                    Verdict::deny(DenialReason::DeviceRisk, Some(fingerprint.clone()))
                        .with_message(reason),
                ));
            }
        }

        let behavior = risk.map(|score| 1.0 - score);
        let decision = self
            .limiter
            .check(subject, action, &ctx.cost, &ctx.adaptive_signals(behavior))
            .await?;

        let verdict = limit_verdict(decision, fingerprint);
        if let Some(denied) = &verdict {
            tracing::warn!(
                subject,
                action = %action,
                fingerprint = fingerprint.short(),
                reason = denied.reason.map(|r| r.as_str()),
                retry_after = denied.retry_after_secs,
                "request denied by limiter"
            );
        }
        Ok(verdict)
    }

    /// Failed lookups fall back to full visibility.
    async fn visibility(&self, user: Option<&UserId>) -> f64 {
        let Some(user) = user else {
            return FULL_VISIBILITY;
        };
        match self.throttles.visibility_multiplier(user).await {
            Ok(visibility) => visibility,
            Err(e) => {
                tracing::error!(subject = user.as_str(), error = %e, "visibility lookup failed");
                FULL_VISIBILITY
            }
        }
    }

    /// Moderation hook: flag-count escalation for `user_id`.
    pub async fn report_flags(
        &self,
        user_id: &UserId,
        flag_count: u32,
    ) -> Result<Option<ThrottleRecord>, DomainError> {
        self.throttles
            .apply_auto_throttle_for_flags(user_id, flag_count)
            .await
    }

    /// Moderation hook: spam escalation for `user_id`.
    pub async fn report_rapid_posting(
        &self,
        user_id: &UserId,
        post_count: u32,
    ) -> Result<ThrottleRecord, DomainError> {
        self.throttles.apply_spam_throttle(user_id, post_count).await
    }
}

/// Account behind a subject, if it is not an anonymous device subject.
fn account_of(subject: &str) -> Option<UserId> {
    if subject.starts_with(ANONYMOUS_SUBJECT_PREFIX) {
        return None;
    }
    UserId::new(subject).ok()
}

fn limit_verdict(decision: LimitDecision, fingerprint: &FingerprintHash) -> Option<Verdict> {
    let denial = decision.denial?;
    let (reason, message) = match denial {
        LimitDenial::Tokens => (DenialReason::RateLimited, "rate limit exceeded"),
        LimitDenial::CostCeiling => (DenialReason::CostLimitExceeded, "daily cost limit exceeded"),
        LimitDenial::EmergencyStop => (DenialReason::EmergencyStop, "service spend limit reached"),
        LimitDenial::Contended => (DenialReason::RateLimited, "too many concurrent requests"),
    };
    Some(
        Verdict::deny(reason, Some(fingerprint.clone()))
            .with_message(message)
            .with_retry_after(decision.retry_after_secs),
    )
}

/// Contention and corrupt state deny whatever the action's policy.
fn unusable_state_verdict(error: &StoreError, fingerprint: FingerprintHash) -> Verdict {
    match error {
        StoreError::Contention { .. } => Verdict::deny(DenialReason::RateLimited, Some(fingerprint))
            .with_message("too many concurrent requests")
            .with_retry_after(CONTENTION_RETRY_SECS),
        _ => Verdict::deny(DenialReason::StoreUnavailable, Some(fingerprint))
            .with_message("admission state is temporarily unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::store::InMemoryKeyValueStore;
    use crate::adapters::throttle::InMemoryThrottleRepository;
    use crate::config::{FingerprintConfig, RateLimitConfig};
    use crate::domain::fingerprint::HeaderSnapshot;
    use crate::domain::foundation::ModeratorId;
    use crate::domain::rate_limit::BucketLimits;
    use crate::domain::throttle::{EscalationRules, NewThrottle, PenaltyOrigin, Severity, ThrottleReason};
    use crate::ports::{Clock, KeyValueStore};
    use async_trait::async_trait;
    use http::StatusCode;
    use std::time::Duration;

    /// Every call fails as if the store were down.
    struct DownStore;

    fn down() -> StoreError {
        StoreError::Unavailable("connection refused".into())
    }

    #[async_trait]
    impl KeyValueStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(down())
        }
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StoreError> {
            Err(down())
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(down())
        }
        async fn increment(&self, _: &str, _: i64, _: Duration) -> Result<i64, StoreError> {
            Err(down())
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Err(down())
        }
        async fn set_add(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(down())
        }
        async fn set_members(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(down())
        }
        async fn set_card(&self, _: &str) -> Result<usize, StoreError> {
            Err(down())
        }
        async fn compare_and_swap(
            &self,
            _: &str,
            _: Option<&str>,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StoreError> {
            Err(down())
        }
        async fn scan_prefix(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(down())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(down())
        }
    }

    struct Pipeline {
        orchestrator: AdmissionOrchestrator,
        clock: Arc<ManualClock>,
    }

    fn pipeline_over(store: Arc<dyn KeyValueStore>, clock: Arc<ManualClock>, rate_limit: RateLimitConfig) -> Pipeline {
        let shared: Arc<dyn Clock> = clock.clone();
        let fingerprints = Arc::new(DeviceFingerprintEngine::new(
            store.clone(),
            shared.clone(),
            Arc::new(FingerprintConfig::default()),
        ));
        let limiter = Arc::new(TokenBucketLimiter::new(store, shared.clone(), rate_limit));
        let throttles = Arc::new(ShadowThrottleEngine::new(
            Arc::new(InMemoryThrottleRepository::new()),
            shared,
            EscalationRules::default(),
        ));
        Pipeline {
            orchestrator: AdmissionOrchestrator::new(
                fingerprints,
                limiter,
                throttles,
                AdmissionConfig::default(),
            ),
            clock,
        }
    }

    fn pipeline() -> Pipeline {
        let clock = Arc::new(ManualClock::fixed());
        let store = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let mut rate_limit = RateLimitConfig::default();
        *rate_limit.actions.get_mut(Action::Message) = BucketLimits::new(3.0, 1.0, 1.0, 0.0);
        pipeline_over(store, clock, rate_limit)
    }

    fn down_pipeline() -> Pipeline {
        pipeline_over(
            Arc::new(DownStore),
            Arc::new(ManualClock::fixed()),
            RateLimitConfig::default(),
        )
    }

    fn browser(ip: &str) -> RequestContext {
        RequestContext::new(
            HeaderSnapshot::from_pairs([
                ("User-Agent", "Mozilla/5.0 (Macintosh) Safari/17.2"),
                ("Accept-Language", "fr-FR"),
                ("Accept-Encoding", "gzip"),
            ]),
            Some(ip.to_string()),
        )
    }

    fn bot(ip: &str) -> RequestContext {
        RequestContext::new(
            HeaderSnapshot::from_pairs([("User-Agent", "python-requests/2.31")]),
            Some(ip.to_string()),
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Happy path
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn clean_request_is_admitted_at_full_visibility() {
        let p = pipeline();
        let verdict = p.orchestrator.admit("alice", Action::Message, &browser("192.0.2.1")).await;

        assert!(verdict.allowed);
        assert_eq!(verdict.http_status, StatusCode::OK);
        assert_eq!(verdict.visibility_multiplier, 1.0);
        assert!(!verdict.degraded);

        let hash = verdict.fingerprint.unwrap();
        let check = p.orchestrator.fingerprints().check_multiple_users(&hash, None).await.unwrap();
        assert_eq!(check.users, vec![UserId::new("alice").unwrap()]);
    }

    #[tokio::test]
    async fn throttled_user_is_admitted_with_reduced_visibility() {
        let p = pipeline();
        let alice = UserId::new("alice").unwrap();
        p.orchestrator
            .throttles()
            .apply_throttle(NewThrottle {
                user_id: alice,
                reason: ThrottleReason::Manual,
                severity: Severity::new(4).unwrap(),
                duration_hours: Some(1),
                origin: PenaltyOrigin::Manual {
                    moderator_id: ModeratorId::new("mod").unwrap(),
                },
                notes: None,
            })
            .await
            .unwrap();

        let verdict = p.orchestrator.admit("alice", Action::Message, &browser("192.0.2.1")).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.visibility_multiplier, 0.15);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Denials
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rate_limit_denial_carries_retry_after() {
        let p = pipeline();
        let ctx = browser("192.0.2.1");
        for _ in 0..3 {
            assert!(p.orchestrator.admit("alice", Action::Message, &ctx).await.allowed);
        }

        let denied = p.orchestrator.admit("alice", Action::Message, &ctx).await;
        assert_eq!(denied.http_status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.reason, Some(DenialReason::RateLimited));
        assert_eq!(denied.retry_after_header(), Some(1));

        p.clock.advance_secs(1);
        assert!(p.orchestrator.admit("alice", Action::Message, &ctx).await.allowed);
    }

    #[tokio::test]
    async fn blocked_device_is_refused_with_reason() {
        let p = pipeline();
        let ctx = browser("192.0.2.1");
        let hash = p.orchestrator.fingerprints().fingerprint(&ctx);
        p.orchestrator
            .fingerprints()
            .block(&hash, "chargeback fraud", Duration::from_secs(600))
            .await
            .unwrap();

        let verdict = p.orchestrator.admit("alice", Action::Message, &ctx).await;
        assert_eq!(verdict.http_status, StatusCode::FORBIDDEN);
        assert_eq!(verdict.reason, Some(DenialReason::DeviceBlocked));
        assert_eq!(verdict.message.as_deref(), Some("chargeback fraud"));
    }

    #[tokio::test]
    async fn suspicious_shared_device_is_auto_blocked() {
        let p = pipeline();
        let ctx = bot("192.0.2.7");
        for user in ["a", "b"] {
            assert!(p.orchestrator.admit(user, Action::ApiCall, &ctx).await.allowed);
        }

        // third account: 0.3 * 2 + 0.4 suspicion = 1.0
        p.orchestrator
            .fingerprints()
            .associate(
                &p.orchestrator.fingerprints().fingerprint(&ctx),
                &UserId::new("c").unwrap(),
            )
            .await
            .unwrap();
        let verdict = p.orchestrator.admit("c", Action::ApiCall, &ctx).await;
        assert_eq!(verdict.reason, Some(DenialReason::DeviceRisk));
        assert_eq!(verdict.http_status, StatusCode::FORBIDDEN);

        let follow_up = p.orchestrator.admit("a", Action::ApiCall, &ctx).await;
        assert_eq!(follow_up.reason, Some(DenialReason::DeviceBlocked));
    }

    #[tokio::test]
    async fn anonymous_callers_are_limited_per_device() {
        let p = pipeline();
        let ctx = browser("192.0.2.9");
        for _ in 0..3 {
            assert!(p.orchestrator.admit_anonymous(Action::Message, &ctx).await.allowed);
        }
        assert!(!p.orchestrator.admit_anonymous(Action::Message, &ctx).await.allowed);
        assert!(p.orchestrator.admit_anonymous(Action::Message, &browser("192.0.2.10")).await.allowed);

        let hash = p.orchestrator.fingerprints().fingerprint(&ctx);
        let check = p.orchestrator.fingerprints().check_multiple_users(&hash, None).await.unwrap();
        assert_eq!(check.user_count, 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Store outage
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn outage_fails_open_for_low_risk_actions() {
        let p = down_pipeline();
        let verdict = p.orchestrator.admit("alice", Action::BulletinPost, &browser("192.0.2.1")).await;
        assert!(verdict.allowed);
        assert!(verdict.degraded);
        assert_eq!(verdict.visibility_multiplier, 1.0);
    }

    #[tokio::test]
    async fn outage_fails_closed_for_login() {
        let p = down_pipeline();
        let verdict = p.orchestrator.admit("alice", Action::Login, &browser("192.0.2.1")).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Some(DenialReason::StoreUnavailable));
        assert_eq!(verdict.http_status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn fail_open_still_applies_known_throttles() {
        let p = down_pipeline();
        p.orchestrator
            .report_rapid_posting(&UserId::new("alice").unwrap(), 45)
            .await
            .unwrap();

        let verdict = p.orchestrator.admit("alice", Action::Message, &browser("192.0.2.1")).await;
        assert!(verdict.degraded);
        assert_eq!(verdict.visibility_multiplier, 0.05);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Reporting hooks
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn flag_reports_escalate_progressively() {
        let p = pipeline();
        let bob = UserId::new("bob").unwrap();

        assert!(p.orchestrator.report_flags(&bob, 2).await.unwrap().is_none());
        let record = p.orchestrator.report_flags(&bob, 10).await.unwrap().unwrap();
        assert_eq!(record.severity.level(), 4);
        assert_eq!(record.expires_at, Some(p.clock.now().plus_hours(168)));
    }
}
