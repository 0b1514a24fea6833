//! Rate limiter configuration

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::domain::rate_limit::{Action, AdaptiveConfig, BucketLimits, SpendConfig};

/// Bucket limits for every known action.
///
/// A struct rather than a map so a missing action cannot exist at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTable {
    pub content_generation: BucketLimits,
    pub bulletin_post: BucketLimits,
    pub location_update: BucketLimits,
    pub photo_upload: BucketLimits,
    pub api_call: BucketLimits,
    pub message: BucketLimits,
    pub login: BucketLimits,
}

impl ActionTable {
    pub fn get(&self, action: Action) -> &BucketLimits {
        match action {
            Action::ContentGeneration => &self.content_generation,
            Action::BulletinPost => &self.bulletin_post,
            Action::LocationUpdate => &self.location_update,
            Action::PhotoUpload => &self.photo_upload,
            Action::ApiCall => &self.api_call,
            Action::Message => &self.message,
            Action::Login => &self.login,
        }
    }

    pub fn get_mut(&mut self, action: Action) -> &mut BucketLimits {
        match action {
            Action::ContentGeneration => &mut self.content_generation,
            Action::BulletinPost => &mut self.bulletin_post,
            Action::LocationUpdate => &mut self.location_update,
            Action::PhotoUpload => &mut self.photo_upload,
            Action::ApiCall => &mut self.api_call,
            Action::Message => &mut self.message,
            Action::Login => &mut self.login,
        }
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self {
            content_generation: BucketLimits::for_action(Action::ContentGeneration),
            bulletin_post: BucketLimits::for_action(Action::BulletinPost),
            location_update: BucketLimits::for_action(Action::LocationUpdate),
            photo_upload: BucketLimits::for_action(Action::PhotoUpload),
            api_call: BucketLimits::for_action(Action::ApiCall),
            message: BucketLimits::for_action(Action::Message),
            login: BucketLimits::for_action(Action::Login),
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Namespace for bucket and spend keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Idle buckets are evicted after this many seconds
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// Optimistic update attempts before giving up under contention
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,

    #[serde(default)]
    pub actions: ActionTable,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    #[serde(default)]
    pub spend: SpendConfig,
}

impl RateLimitConfig {
    pub fn limits(&self, action: Action) -> &BucketLimits {
        self.actions.get(action)
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.is_empty() {
            return Err(ValidationError::MissingRequired("RATE_LIMIT__KEY_PREFIX"));
        }
        if self.idle_ttl_secs == 0 {
            return Err(ValidationError::NonPositive("rate_limit.idle_ttl_secs"));
        }
        if self.max_cas_attempts == 0 {
            return Err(ValidationError::NonPositive("rate_limit.max_cas_attempts"));
        }

        for action in Action::ALL {
            validate_limits(action, self.actions.get(action))?;
        }

        let weights = self.adaptive.weights.sum();
        if (weights - 1.0).abs() > 1e-6 {
            return Err(ValidationError::AdaptiveWeightsSum(weights));
        }
        if self.adaptive.min_capacity_multiplier <= 0.0 {
            return Err(ValidationError::NonPositive(
                "rate_limit.adaptive.min_capacity_multiplier",
            ));
        }
        if self.adaptive.min_capacity_multiplier > self.adaptive.max_capacity_multiplier {
            return Err(ValidationError::InvertedMultiplierBounds);
        }

        if self.spend.enabled {
            if self.spend.daily_limit <= 0.0 {
                return Err(ValidationError::NonPositive("rate_limit.spend.daily_limit"));
            }
            if self.spend.emergency_stop_threshold <= 0.0 {
                return Err(ValidationError::NonPositive(
                    "rate_limit.spend.emergency_stop_threshold",
                ));
            }
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn validate_limits(action: Action, limits: &BucketLimits) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidActionLimits { action, reason };

    if !positive(limits.capacity) {
        return Err(invalid("capacity must be positive"));
    }
    if !positive(limits.refill_rate) {
        return Err(invalid("refill_rate must be positive"));
    }
    if !positive(limits.cost_per_request) {
        return Err(invalid("cost_per_request must be positive"));
    }
    if limits.cost_per_request > limits.capacity + limits.burst_allowance {
        return Err(invalid("cost_per_request exceeds capacity plus burst"));
    }
    if !non_negative(limits.burst_allowance) {
        return Err(invalid("burst_allowance cannot be negative"));
    }
    if !non_negative(limits.monetary_cost) {
        return Err(invalid("monetary_cost cannot be negative"));
    }
    Ok(())
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            idle_ttl_secs: default_idle_ttl(),
            max_cas_attempts: default_max_cas_attempts(),
            actions: ActionTable::default(),
            adaptive: AdaptiveConfig::default(),
            spend: SpendConfig::default(),
        }
    }
}

fn default_key_prefix() -> String {
    "rate_limit".to_string()
}

fn default_idle_ttl() -> u64 {
    3600
}

fn default_max_cas_attempts() -> u32 {
    16
}
