//! ListActiveThrottlesHandler - query for the moderation console.

use std::sync::Arc;

use super::ModerationError;
use crate::application::throttle::ShadowThrottleEngine;
use crate::domain::foundation::{ModeratorId, UserId};
use crate::domain::throttle::ThrottleRecord;

#[derive(Debug, Clone)]
pub struct ListActiveThrottlesQuery {
    pub moderator_id: ModeratorId,
    /// Restrict to one user.
    pub user_id: Option<UserId>,
}

pub struct ListActiveThrottlesHandler {
    throttles: Arc<ShadowThrottleEngine>,
}

impl ListActiveThrottlesHandler {
    pub fn new(throttles: Arc<ShadowThrottleEngine>) -> Self {
        Self { throttles }
    }

    /// Active throttles, newest first.
    pub async fn handle(
        &self,
        query: ListActiveThrottlesQuery,
    ) -> Result<Vec<ThrottleRecord>, ModerationError> {
        let mut active = self.throttles.list_active().await?;
        if let Some(user_id) = &query.user_id {
            active.retain(|r| &r.user_id == user_id);
        }

        tracing::debug!(
            moderator = query.moderator_id.as_str(),
            count = active.len(),
            "moderator listed active throttles"
        );
        Ok(active)
    }
}
