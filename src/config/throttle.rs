//! Shadow throttle configuration

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::domain::throttle::{EscalationRules, Severity};

/// Shadow throttle configuration
///
/// The severity table is fixed; only the escalation inputs are tunable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub escalation: EscalationRules,
}

impl ThrottleConfig {
    /// Validate throttle configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        for tier in &self.escalation.flag_tiers {
            if Severity::new(tier.severity).is_err() {
                return Err(ValidationError::InvalidSeverity(tier.severity));
            }
            if tier.min_flags == 0 {
                return Err(ValidationError::NonPositive("throttle.escalation.flag_tiers.min_flags"));
            }
        }
        if self.escalation.spam_posts_per_severity == 0 {
            return Err(ValidationError::NonPositive(
                "throttle.escalation.spam_posts_per_severity",
            ));
        }
        if self.escalation.spam_hours_per_severity == 0 {
            return Err(ValidationError::NonPositive(
                "throttle.escalation.spam_hours_per_severity",
            ));
        }
        Ok(())
    }
}
