use serde::Serialize;

use crate::domain::foundation::{Timestamp, UserId};

/// Longest manual device block: one year.
pub const MAX_BLOCK_SECS: u64 = 365 * 86_400;

/// Result of a block lookup. `until` is an approximation derived from the
/// store's remaining TTL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatus {
    pub blocked: bool,
    pub reason: Option<String>,
    pub until: Option<Timestamp>,
}

impl BlockStatus {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
            until: None,
        }
    }
}

/// Multi-account check for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiUserCheck {
    /// True when more users than allowed share the device.
    pub suspicious: bool,
    pub user_count: usize,
    pub users: Vec<UserId>,
}

/// Population counts across every device the store remembers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub total_devices: usize,
    pub blocked_devices: usize,
    pub suspicious_devices: usize,
    /// Devices with more than one associated user.
    pub multi_user_devices: usize,
}

/// Moderator view of everything known about a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAnalysis {
    pub associated_users: Vec<UserId>,
    pub requests_this_minute: u64,
    pub multi_account: bool,
    pub block: BlockStatus,
    pub risk_score: f64,
}
