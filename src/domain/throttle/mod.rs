//! Shadow throttle domain - severity-ranked visibility penalties.
//!
//! Consumers only ever see one number: the lowest visibility multiplier among
//! a user's active throttles, or 1.0 when there are none.

mod escalation;
mod record;
mod severity;

pub use escalation::{EscalationRules, FlagTier, ThrottlePlan};
pub use record::{
    most_severe_active, visibility_from, AutoRule, MAX_THROTTLE_HOURS, NewThrottle, PenaltyOrigin, ThrottleReason,
    ThrottleRecord,
};
pub use severity::{visibility_for_level, Severity, FULL_VISIBILITY};
