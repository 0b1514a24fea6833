//! RemoveThrottleHandler - lifts throttles by user or by id.

use std::sync::Arc;

use super::ModerationError;
use crate::application::throttle::ShadowThrottleEngine;
use crate::domain::foundation::{ModeratorId, ThrottleId, UserId};

#[derive(Debug, Clone)]
pub enum RemovalTarget {
    /// Every active throttle of the user.
    User(UserId),
    /// One row.
    Throttle(ThrottleId),
}

#[derive(Debug, Clone)]
pub struct RemoveThrottleCommand {
    pub moderator_id: ModeratorId,
    pub target: RemovalTarget,
}

pub struct RemoveThrottleHandler {
    throttles: Arc<ShadowThrottleEngine>,
}

impl RemoveThrottleHandler {
    pub fn new(throttles: Arc<ShadowThrottleEngine>) -> Self {
        Self { throttles }
    }

    /// Returns how many throttles were removed. Nothing to remove is not an error.
    pub async fn handle(&self, cmd: RemoveThrottleCommand) -> Result<u64, ModerationError> {
        let removed = match &cmd.target {
            RemovalTarget::User(user_id) => self.throttles.remove_throttle(user_id).await?,
            RemovalTarget::Throttle(id) => {
                u64::from(self.throttles.remove_throttle_by_id(*id).await?)
            }
        };

        tracing::info!(
            moderator = cmd.moderator_id.as_str(),
            target = ?cmd.target,
            removed,
            "moderator removed throttle"
        );
        Ok(removed)
    }
}
