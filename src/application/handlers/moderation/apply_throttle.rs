//! ApplyThrottleHandler - manual shadow throttle with explicit severity.

use std::sync::Arc;

use super::ModerationError;
use crate::application::throttle::ShadowThrottleEngine;
use crate::domain::foundation::{ModeratorId, UserId, ValidationError};
use crate::domain::throttle::{
    NewThrottle, PenaltyOrigin, Severity, ThrottleReason, ThrottleRecord, MAX_THROTTLE_HOURS,
};

#[derive(Debug, Clone)]
pub struct ApplyThrottleCommand {
    pub moderator_id: ModeratorId,
    pub user_id: UserId,
    pub reason: ThrottleReason,
    /// Raw level from the console; must be 1-5.
    pub severity: u8,
    /// `None` makes the throttle permanent. At most `MAX_THROTTLE_HOURS`.
    pub duration_hours: Option<u32>,
    pub notes: Option<String>,
}

pub struct ApplyThrottleHandler {
    throttles: Arc<ShadowThrottleEngine>,
}

impl ApplyThrottleHandler {
    pub fn new(throttles: Arc<ShadowThrottleEngine>) -> Self {
        Self { throttles }
    }

    pub async fn handle(&self, cmd: ApplyThrottleCommand) -> Result<ThrottleRecord, ModerationError> {
        let severity = Severity::new(cmd.severity)?;
        if let Some(hours) = cmd.duration_hours {
            if hours == 0 || hours > MAX_THROTTLE_HOURS {
                return Err(ValidationError::out_of_range(
                    "duration_hours",
                    1,
                    MAX_THROTTLE_HOURS as i32,
                    i32::try_from(hours).unwrap_or(i32::MAX),
                )
                .into());
            }
        }

        let record = self
            .throttles
            .apply_throttle(NewThrottle {
                user_id: cmd.user_id,
                reason: cmd.reason,
                severity,
                duration_hours: cmd.duration_hours,
                origin: PenaltyOrigin::Manual {
                    moderator_id: cmd.moderator_id.clone(),
                },
                notes: cmd.notes,
            })
            .await?;

        tracing::info!(
            moderator = cmd.moderator_id.as_str(),
            subject = record.user_id.as_str(),
            throttle_id = %record.id,
            severity = record.severity.level(),
            "moderator applied throttle"
        );
        Ok(record)
    }
}
