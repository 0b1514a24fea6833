//! Additive device risk model.
//!
//! Each factor adds a fixed weight and the total is clamped to `[0, 1]`.
//! The constants are tunable parameters, not calibrated probabilities.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Added per associated user beyond the first.
    #[serde(default = "default_per_extra_user")]
    pub per_extra_user: f64,
    #[serde(default = "default_high_volume")]
    pub high_volume: f64,
    /// Request count (current minute) above which `high_volume` applies.
    #[serde(default = "default_high_volume_requests")]
    pub high_volume_requests: u64,
    #[serde(default = "default_suspicious")]
    pub suspicious: f64,
    #[serde(default = "default_blocked")]
    pub blocked: f64,
}

fn default_per_extra_user() -> f64 {
    0.3
}

fn default_high_volume() -> f64 {
    0.2
}

fn default_high_volume_requests() -> u64 {
    100
}

fn default_suspicious() -> f64 {
    0.4
}

fn default_blocked() -> f64 {
    0.5
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            per_extra_user: default_per_extra_user(),
            high_volume: default_high_volume(),
            high_volume_requests: default_high_volume_requests(),
            suspicious: default_suspicious(),
            blocked: default_blocked(),
        }
    }
}

/// Observed facts about a device at scoring time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskFactors {
    pub associated_users: usize,
    pub request_count: u64,
    pub suspicious: bool,
    pub blocked: bool,
}

pub fn risk_score(factors: &RiskFactors, weights: &RiskWeights) -> f64 {
    let mut score = 0.0;

    if factors.associated_users > 1 {
        score += (weights.per_extra_user * (factors.associated_users - 1) as f64).max(0.0);
    }
    if factors.request_count > weights.high_volume_requests {
        score += weights.high_volume.max(0.0);
    }
    if factors.suspicious {
        score += weights.suspicious.max(0.0);
    }
    if factors.blocked {
        score += weights.blocked.max(0.0);
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clean_device_scores_zero() {
        let factors = RiskFactors {
            associated_users: 1,
            request_count: 5,
            ..RiskFactors::default()
        };
        assert_eq!(risk_score(&factors, &RiskWeights::default()), 0.0);
    }

    #[test]
    fn factors_add_up() {
        let factors = RiskFactors {
            associated_users: 2,
            request_count: 101,
            suspicious: false,
            blocked: false,
        };
        assert!((risk_score(&factors, &RiskWeights::default()) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn everything_at_once_is_clamped_to_one() {
        let factors = RiskFactors {
            associated_users: 9,
            request_count: 10_000,
            suspicious: true,
            blocked: true,
        };
        assert_eq!(risk_score(&factors, &RiskWeights::default()), 1.0);
    }

    #[test]
    fn suspicion_plus_three_accounts_crosses_default_auto_block() {
        let factors = RiskFactors {
            associated_users: 3,
            request_count: 1,
            suspicious: true,
            blocked: false,
        };
        assert!(risk_score(&factors, &RiskWeights::default()) >= 0.8);
    }

    fn factors() -> impl Strategy<Value = RiskFactors> {
        (0usize..20, 0u64..500, any::<bool>(), any::<bool>()).prop_map(
            |(associated_users, request_count, suspicious, blocked)| RiskFactors {
                associated_users,
                request_count,
                suspicious,
                blocked,
            },
        )
    }

    proptest! {
        #[test]
        fn score_is_always_in_unit_interval(f in factors()) {
            let score = risk_score(&f, &RiskWeights::default());
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn adding_a_factor_never_lowers_the_score(
            f in factors(),
            extra_users in 0usize..5,
            extra_requests in 0u64..200,
            add_suspicion in any::<bool>(),
            add_block in any::<bool>(),
        ) {
            let weights = RiskWeights::default();
            let more = RiskFactors {
                associated_users: f.associated_users + extra_users,
                request_count: f.request_count + extra_requests,
                suspicious: f.suspicious || add_suspicion,
                blocked: f.blocked || add_block,
            };
            prop_assert!(risk_score(&more, &weights) >= risk_score(&f, &weights));
        }
    }
}
