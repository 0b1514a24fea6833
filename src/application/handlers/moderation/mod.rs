//! Moderation handlers - the administrative interface.
//!
//! Every mutation carries the acting `ModeratorId` and is logged for audit.

mod apply_throttle;
mod block_device;
mod get_trust_stats;
mod list_active_throttles;
mod remove_throttle;
mod unblock_device;

pub use apply_throttle::{ApplyThrottleCommand, ApplyThrottleHandler};
pub use block_device::{BlockDeviceCommand, BlockDeviceHandler};
pub use get_trust_stats::{GetTrustStatsHandler, GetTrustStatsQuery, TrustStats};
pub use list_active_throttles::{ListActiveThrottlesHandler, ListActiveThrottlesQuery};
pub use remove_throttle::{RemovalTarget, RemoveThrottleCommand, RemoveThrottleHandler};
pub use unblock_device::{UnblockDeviceCommand, UnblockDeviceHandler};

use thiserror::Error;

use crate::domain::foundation::{DomainError, ValidationError};
use crate::ports::StoreError;

/// Errors surfaced to the moderation console.
#[derive(Debug, Clone, Error)]
pub enum ModerationError {
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
