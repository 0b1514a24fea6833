//! DeviceFingerprintEngine - device identity, multi-account and bot checks.
//!
//! Store layout under `{prefix}`:
//! - `{prefix}:{hash}` set of associated user ids, TTL = block duration
//! - `{prefix}:blocked:{hash}` block reason, TTL = block duration
//! - `{prefix}:requests:{hash}:{minute}` per-minute counter, TTL 60s
//! - `{prefix}:suspicious:{hash}` marker left by a suspicious evaluation

use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FingerprintConfig;
use crate::domain::admission::RequestContext;
use crate::domain::fingerprint::{
    hash_ip, risk_score, BlockStatus, DeviceAnalysis, DeviceStats, Evaluation, FingerprintHash, HeaderSnapshot,
    MultiUserCheck, RiskFactors,
};
use crate::domain::foundation::UserId;
use crate::ports::{Clock, KeyValueStore, StoreError};

const REQUEST_COUNTER_TTL: Duration = Duration::from_secs(60);

enum DeviceKey {
    Users,
    Blocked,
    Suspicious,
    Requests,
}

pub struct DeviceFingerprintEngine {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: Arc<FingerprintConfig>,
}

impl DeviceFingerprintEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: Arc<FingerprintConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn users_key(&self, hash: &FingerprintHash) -> String {
        format!("{}:{}", self.config.key_prefix, hash)
    }

    fn blocked_key(&self, hash: &FingerprintHash) -> String {
        format!("{}:blocked:{}", self.config.key_prefix, hash)
    }

    fn suspicious_key(&self, hash: &FingerprintHash) -> String {
        format!("{}:suspicious:{}", self.config.key_prefix, hash)
    }

    fn requests_key(&self, hash: &FingerprintHash) -> String {
        format!(
            "{}:requests:{}:{}",
            self.config.key_prefix,
            hash,
            self.clock.now().minute_stamp()
        )
    }

    /// Derives the device hash. A request without a client IP hashes the
    /// empty string, so such requests share one IP component.
    pub fn fingerprint(&self, ctx: &RequestContext) -> FingerprintHash {
        let ip_hash = hash_ip(
            ctx.client_ip.as_deref().unwrap_or_default(),
            self.config.server_secret.expose_secret(),
        );
        FingerprintHash::derive(&ctx.headers, &ip_hash)
    }

    /// Counts this request against the current minute and runs the header
    /// heuristics. A suspicious result is remembered for `risk_score`.
    pub async fn evaluate(
        &self,
        hash: &FingerprintHash,
        headers: &HeaderSnapshot,
    ) -> Result<Evaluation, StoreError> {
        let count = self
            .store
            .increment(&self.requests_key(hash), 1, REQUEST_COUNTER_TTL)
            .await?;

        let evaluation = Evaluation::from_checks(
            headers,
            &self.config.bot_user_agent_patterns,
            count.max(0) as u64,
            self.config.max_requests_per_minute,
        );

        if evaluation.suspicious {
            self.store
                .set(
                    &self.suspicious_key(hash),
                    &evaluation.summary(),
                    Some(self.config.suspicion_ttl()),
                )
                .await?;
            tracing::debug!(
                fingerprint = hash.short(),
                reason = %evaluation.summary(),
                "suspicious device evaluation"
            );
        }

        Ok(evaluation)
    }

    /// Records that `user_id` was seen on this device. Refreshes the set TTL.
    pub async fn associate(&self, hash: &FingerprintHash, user_id: &UserId) -> Result<(), StoreError> {
        let added = self
            .store
            .set_add(
                &self.users_key(hash),
                user_id.as_str(),
                self.config.device_block_duration(),
            )
            .await?;
        if added {
            tracing::debug!(fingerprint = hash.short(), "new user associated with device");
        }
        Ok(())
    }

    /// Multi-account check. A `candidate` not yet associated is counted as if
    /// it were, so the check can run before `associate`.
    pub async fn check_multiple_users(
        &self,
        hash: &FingerprintHash,
        candidate: Option<&UserId>,
    ) -> Result<MultiUserCheck, StoreError> {
        let members = self.store.set_members(&self.users_key(hash)).await?;
        let mut users: Vec<UserId> = members.into_iter().filter_map(|m| UserId::new(m).ok()).collect();

        if let Some(candidate) = candidate {
            if !users.contains(candidate) {
                users.push(candidate.clone());
            }
        }

        let user_count = users.len();
        Ok(MultiUserCheck {
            suspicious: user_count > self.config.max_users_per_device,
            user_count,
            users,
        })
    }

    /// Block lookup. `until` is approximated from the remaining TTL.
    pub async fn is_blocked(&self, hash: &FingerprintHash) -> Result<BlockStatus, StoreError> {
        let key = self.blocked_key(hash);
        let Some(reason) = self.store.get(&key).await? else {
            return Ok(BlockStatus::clear());
        };
        let until = self
            .store
            .ttl(&key)
            .await?
            .map(|remaining| self.clock.now().plus_secs_f64(remaining.as_secs_f64()));
        Ok(BlockStatus {
            blocked: true,
            reason: Some(reason),
            until,
        })
    }

    /// Blocks the device for `duration`, replacing any existing block.
    pub async fn block(
        &self,
        hash: &FingerprintHash,
        reason: &str,
        duration: Duration,
    ) -> Result<(), StoreError> {
        self.store
            .set(&self.blocked_key(hash), reason, Some(duration))
            .await?;
        tracing::warn!(
            fingerprint = hash.short(),
            reason,
            duration_secs = duration.as_secs(),
            "device blocked"
        );
        Ok(())
    }

    /// Lifts a block. Returns false if the device was not blocked.
    pub async fn unblock(&self, hash: &FingerprintHash) -> Result<bool, StoreError> {
        let removed = self.store.delete(&self.blocked_key(hash)).await?;
        if removed {
            tracing::info!(fingerprint = hash.short(), "device unblocked");
        }
        Ok(removed)
    }

    /// Additive risk in `[0, 1]`. Reads the request counter without counting.
    pub async fn risk_score(&self, hash: &FingerprintHash) -> Result<f64, StoreError> {
        let factors = self.risk_factors(hash).await?;
        Ok(risk_score(&factors, &self.config.risk))
    }

    async fn risk_factors(&self, hash: &FingerprintHash) -> Result<RiskFactors, StoreError> {
        let associated_users = self.store.set_card(&self.users_key(hash)).await?;
        let request_count = self.requests_this_minute(hash).await?;
        let flagged = self.store.get(&self.suspicious_key(hash)).await?.is_some();
        let blocked = self.store.get(&self.blocked_key(hash)).await?.is_some();

        Ok(RiskFactors {
            associated_users,
            request_count,
            suspicious: flagged || associated_users > self.config.max_users_per_device,
            blocked,
        })
    }

    async fn requests_this_minute(&self, hash: &FingerprintHash) -> Result<u64, StoreError> {
        let key = self.requests_key(hash);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| StoreError::corrupt(key.as_str(), e.to_string())),
        }
    }

    /// Everything known about a device, for moderators.
    pub async fn analyze(&self, hash: &FingerprintHash) -> Result<DeviceAnalysis, StoreError> {
        let users = self.check_multiple_users(hash, None).await?;
        let block = self.is_blocked(hash).await?;
        let requests_this_minute = self.requests_this_minute(hash).await?;
        let risk_score = self.risk_score(hash).await?;

        Ok(DeviceAnalysis {
            associated_users: users.users,
            requests_this_minute,
            multi_account: users.suspicious,
            block,
            risk_score,
        })
    }

    /// Counts devices by what the store holds for them. A device is known if
    /// any of its keys is live.
    pub async fn device_stats(&self) -> Result<DeviceStats, StoreError> {
        let prefix = format!("{}:", self.config.key_prefix);
        let mut devices = HashSet::new();
        let mut stats = DeviceStats::default();

        for key in self.store.scan_prefix(&prefix).await? {
            let rest = &key[prefix.len()..];
            let (kind, hash) = match rest.split_once(':') {
                Some(("blocked", hash)) => (DeviceKey::Blocked, hash),
                Some(("suspicious", hash)) => (DeviceKey::Suspicious, hash),
                Some(("requests", tail)) => {
                    (DeviceKey::Requests, tail.split(':').next().unwrap_or_default())
                }
                _ => (DeviceKey::Users, rest),
            };
            let Ok(hash) = FingerprintHash::parse(hash) else {
                continue;
            };
            match kind {
                DeviceKey::Blocked => stats.blocked_devices += 1,
                DeviceKey::Suspicious => stats.suspicious_devices += 1,
                DeviceKey::Users => {
                    if self.store.set_card(&key).await? > 1 {
                        stats.multi_user_devices += 1;
                    }
                }
                DeviceKey::Requests => {}
            }
            devices.insert(hash);
        }

        stats.total_devices = devices.len();
        Ok(stats)
    }

    /// True for a well-formed hash whose device is not blocked.
    pub async fn validate_hash(&self, raw: &str) -> Result<bool, StoreError> {
        let Ok(hash) = FingerprintHash::parse(raw) else {
            return Ok(false);
        };
        Ok(!self.is_blocked(&hash).await?.blocked)
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }
}
