//! Token bucket state and the refill/consume arithmetic.
//!
//! Decay is algebraic: a stored bucket is never touched by a timer, its
//! level is recomputed from the elapsed time whenever it is read.

use serde::{Deserialize, Serialize};

use super::Action;
use crate::domain::foundation::Timestamp;

/// Tunables for one action's bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketLimits {
    /// Steady-state bucket size. New buckets start full at this level.
    pub capacity: f64,
    /// Tokens added per second of elapsed time.
    pub refill_rate: f64,
    /// Tokens taken by one request before context adjustments.
    pub cost_per_request: f64,
    /// Headroom above `capacity` that idle time may accumulate.
    #[serde(default)]
    pub burst_allowance: f64,
    /// Monetary cost charged to the daily spend ledger per admitted request.
    #[serde(default)]
    pub monetary_cost: f64,
}

impl BucketLimits {
    pub fn new(capacity: f64, refill_rate: f64, cost_per_request: f64, burst_allowance: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            cost_per_request,
            burst_allowance,
            monetary_cost: 0.0,
        }
    }

    /// Sets the monetary cost per admitted request.
    pub fn with_monetary_cost(mut self, monetary_cost: f64) -> Self {
        self.monetary_cost = monetary_cost;
        self
    }

    /// Shipped defaults per action.
    pub fn for_action(action: Action) -> Self {
        match action {
            Action::ContentGeneration => Self::new(10.0, 1.0, 1.0, 5.0).with_monetary_cost(0.002),
            Action::BulletinPost => Self::new(20.0, 2.0, 1.0, 10.0),
            Action::LocationUpdate => Self::new(50.0, 5.0, 1.0, 25.0),
            Action::PhotoUpload => Self::new(15.0, 1.0, 2.0, 5.0),
            Action::ApiCall => Self::new(1000.0, 100.0, 1.0, 200.0),
            Action::Message => Self::new(30.0, 1.0, 1.0, 10.0),
            Action::Login => Self::new(5.0, 0.1, 1.0, 0.0),
        }
    }

    /// Hard upper bound on the token level.
    pub fn ceiling(&self) -> f64 {
        self.capacity + self.burst_allowance
    }

    /// Returns these limits with capacity and refill rate scaled.
    ///
    /// Burst allowance and costs are not scaled.
    pub fn scaled(&self, multiplier: f64) -> Self {
        Self {
            capacity: self.capacity * multiplier,
            refill_rate: self.refill_rate * multiplier,
            ..self.clone()
        }
    }
}

/// Persisted bucket. Serialized as JSON under `rate_limit:{action}:{subject}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill_ms: i64,
}

/// Outcome of a consume attempt against a refilled bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsumeDecision {
    /// Enough tokens: `next` must be persisted.
    Admitted { next: BucketState, remaining: f64 },
    /// Not enough tokens. Nothing needs to be written.
    Denied { available: f64, retry_after_secs: f64 },
}

impl ConsumeDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, ConsumeDecision::Admitted { .. })
    }
}

impl BucketState {
    /// A bucket seen for the first time starts at `capacity`.
    pub fn fresh(limits: &BucketLimits, now: Timestamp) -> Self {
        Self {
            tokens: limits.capacity.clamp(0.0, limits.ceiling().max(0.0)),
            last_refill_ms: now.as_unix_millis(),
        }
    }

    /// Applies the elapsed-time refill, capped at the ceiling.
    ///
    /// A stored level above the current ceiling (limits were scaled down since
    /// it was written) is clamped first.
    pub fn refilled(&self, limits: &BucketLimits, now: Timestamp) -> Self {
        let ceiling = limits.ceiling().max(0.0);
        let last = Timestamp::from_unix_millis(self.last_refill_ms);
        let elapsed = now.secs_since(&last);
        let tokens = (self.tokens.clamp(0.0, ceiling) + elapsed * limits.refill_rate).min(ceiling);
        Self {
            tokens,
            last_refill_ms: self.last_refill_ms.max(now.as_unix_millis()),
        }
    }

    /// Refills, then takes exactly `cost` tokens if they are available.
    pub fn consume(&self, limits: &BucketLimits, cost: f64, now: Timestamp) -> ConsumeDecision {
        let current = self.refilled(limits, now);
        if current.tokens >= cost {
            let next = BucketState {
                tokens: current.tokens - cost,
                last_refill_ms: current.last_refill_ms,
            };
            ConsumeDecision::Admitted {
                next,
                remaining: next.tokens,
            }
        } else {
            let retry_after_secs = if limits.refill_rate > 0.0 {
                (cost - current.tokens) / limits.refill_rate
            } else {
                f64::INFINITY
            };
            ConsumeDecision::Denied {
                available: current.tokens,
                retry_after_secs,
            }
        }
    }

    /// Non-consuming view of the bucket at `now`.
    pub fn status(&self, limits: &BucketLimits, now: Timestamp) -> BucketStatus {
        let current = self.refilled(limits, now);
        let missing = (limits.capacity - current.tokens).max(0.0);
        let secs_to_full = if limits.refill_rate > 0.0 {
            missing / limits.refill_rate
        } else {
            0.0
        };
        let percentage_used = if limits.capacity > 0.0 {
            ((missing / limits.capacity) * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        BucketStatus {
            tokens: current.tokens,
            capacity: limits.capacity,
            refill_rate: limits.refill_rate,
            burst_allowance: limits.burst_allowance,
            full_at: now.plus_secs_f64(secs_to_full),
            percentage_used,
        }
    }
}

/// Read-only snapshot of a bucket for dashboards and support tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStatus {
    pub tokens: f64,
    pub capacity: f64,
    pub refill_rate: f64,
    pub burst_allowance: f64,
    /// When the bucket is back at `capacity` if left idle.
    pub full_at: Timestamp,
    /// Share of `capacity` currently spent, 0-100 with two decimals.
    pub percentage_used: f64,
}
