//! Automatic escalation curves for flag counts and posting volume.

use serde::{Deserialize, Serialize};

use super::{AutoRule, Severity, ThrottleReason};

/// Minimum flag count that maps to a throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagTier {
    pub min_flags: u32,
    pub severity: u8,
    pub duration_hours: u32,
}

impl FlagTier {
    pub fn new(min_flags: u32, severity: u8, duration_hours: u32) -> Self {
        Self {
            min_flags,
            severity,
            duration_hours,
        }
    }
}

/// A throttle an escalation rule wants applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePlan {
    pub rule: AutoRule,
    pub reason: ThrottleReason,
    pub severity: Severity,
    pub duration_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRules {
    #[serde(default = "default_flag_tiers")]
    pub flag_tiers: Vec<FlagTier>,
    /// Posts per severity step for the spam curve.
    #[serde(default = "default_spam_posts_per_severity")]
    pub spam_posts_per_severity: u32,
    #[serde(default = "default_spam_hours_per_severity")]
    pub spam_hours_per_severity: u32,
}

fn default_flag_tiers() -> Vec<FlagTier> {
    vec![
        FlagTier::new(10, 4, 168),
        FlagTier::new(5, 3, 72),
        FlagTier::new(3, 2, 24),
    ]
}

fn default_spam_posts_per_severity() -> u32 {
    10
}

fn default_spam_hours_per_severity() -> u32 {
    12
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            flag_tiers: default_flag_tiers(),
            spam_posts_per_severity: default_spam_posts_per_severity(),
            spam_hours_per_severity: default_spam_hours_per_severity(),
        }
    }
}

impl EscalationRules {
    /// Highest tier the flag count reaches, or `None` below the lowest tier.
    pub fn for_flags(&self, flag_count: u32) -> Option<ThrottlePlan> {
        self.flag_tiers
            .iter()
            .filter(|tier| flag_count >= tier.min_flags)
            .max_by_key(|tier| tier.min_flags)
            .map(|tier| ThrottlePlan {
                rule: AutoRule::FlagThreshold,
                reason: ThrottleReason::FlaggedContent,
                severity: Severity::saturating(tier.severity as i64),
                duration_hours: tier.duration_hours,
            })
    }

    /// `severity = min(5, ceil(posts / step))`, at least 1; duration scales with it.
    pub fn for_spam(&self, post_count: u32) -> ThrottlePlan {
        let step = self.spam_posts_per_severity.max(1);
        let severity = Severity::saturating(post_count.div_ceil(step) as i64);
        ThrottlePlan {
            rule: AutoRule::SpamVolume,
            reason: ThrottleReason::RapidPosting,
            severity,
            duration_hours: severity.level() as u32 * self.spam_hours_per_severity,
        }
    }
}
