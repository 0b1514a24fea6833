use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Severity, FULL_VISIBILITY};
use crate::domain::foundation::{ModeratorId, ThrottleId, Timestamp, UserId, ValidationError};

/// Longest timed throttle a moderator may set. Longer penalties are permanent.
pub const MAX_THROTTLE_HOURS: u32 = 8_760;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    FlaggedContent,
    RapidPosting,
    Manual,
    Spoofing,
}

impl ThrottleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleReason::FlaggedContent => "flagged_content",
            ThrottleReason::RapidPosting => "rapid_posting",
            ThrottleReason::Manual => "manual",
            ThrottleReason::Spoofing => "spoofing",
        }
    }
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThrottleReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flagged_content" => Ok(ThrottleReason::FlaggedContent),
            "rapid_posting" => Ok(ThrottleReason::RapidPosting),
            "manual" => Ok(ThrottleReason::Manual),
            "spoofing" => Ok(ThrottleReason::Spoofing),
            other => Err(ValidationError::invalid_format(
                "reason",
                format!("unknown throttle reason '{}'", other),
            )),
        }
    }
}

/// Escalation rule that produced an automatic throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRule {
    FlagThreshold,
    SpamVolume,
}

impl AutoRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoRule::FlagThreshold => "flag_threshold",
            AutoRule::SpamVolume => "spam_volume",
        }
    }
}

impl FromStr for AutoRule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flag_threshold" => Ok(AutoRule::FlagThreshold),
            "spam_volume" => Ok(AutoRule::SpamVolume),
            other => Err(ValidationError::invalid_format(
                "auto_rule",
                format!("unknown escalation rule '{}'", other),
            )),
        }
    }
}

/// Who decided a penalty: an escalation rule or a named moderator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltyOrigin {
    Automatic { rule: AutoRule },
    Manual { moderator_id: ModeratorId },
}

impl PenaltyOrigin {
    pub fn moderator(&self) -> Option<&ModeratorId> {
        match self {
            PenaltyOrigin::Manual { moderator_id } => Some(moderator_id),
            PenaltyOrigin::Automatic { .. } => None,
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, PenaltyOrigin::Automatic { .. })
    }
}

/// Request to start a throttle. `duration_hours = None` means permanent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewThrottle {
    pub user_id: UserId,
    pub reason: ThrottleReason,
    pub severity: Severity,
    pub duration_hours: Option<u32>,
    pub origin: PenaltyOrigin,
    pub notes: Option<String>,
}

/// One penalty instance as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleRecord {
    pub id: ThrottleId,
    pub user_id: UserId,
    pub reason: ThrottleReason,
    pub severity: Severity,
    pub visibility_multiplier: f64,
    pub started_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub origin: PenaltyOrigin,
    pub notes: Option<String>,
}

impl ThrottleRecord {
    /// Starts a throttle at `now`.
    pub fn start(new: NewThrottle, now: Timestamp) -> Self {
        Self {
            id: ThrottleId::new(),
            visibility_multiplier: new.severity.visibility_multiplier(),
            expires_at: new.duration_hours.map(|hours| now.plus_hours(hours)),
            started_at: now,
            user_id: new.user_id,
            reason: new.reason,
            severity: new.severity,
            origin: new.origin,
            notes: new.notes,
        }
    }

    /// Started, and either permanent or not yet expired.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.started_at <= now && self.expires_at.map_or(true, |end| end > now)
    }

    /// Eligible for physical deletion by the pruning pass.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|end| end <= now)
    }
}

/// Most severe active throttle, ties broken by most recent `started_at`.
pub fn most_severe_active(records: &[ThrottleRecord], now: Timestamp) -> Option<&ThrottleRecord> {
    records
        .iter()
        .filter(|r| r.is_active(now))
        .max_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| a.started_at.cmp(&b.started_at))
        })
}

/// Lowest multiplier among active throttles, or full visibility.
pub fn visibility_from(records: &[ThrottleRecord], now: Timestamp) -> f64 {
    records
        .iter()
        .filter(|r| r.is_active(now))
        .map(|r| r.visibility_multiplier)
        .fold(FULL_VISIBILITY, f64::min)
}
