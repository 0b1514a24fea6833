//! Rate-limited actions.
//!
//! The set is closed: configuration is keyed by this enum and a string that
//! does not name one of these actions is rejected instead of defaulted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sensitive write path governed by its own token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// AI-assisted content generation (profile bios, openers).
    ContentGeneration,
    /// Public bulletin board posts.
    BulletinPost,
    /// Location pings for proximity features.
    LocationUpdate,
    /// Photo uploads.
    PhotoUpload,
    /// Generic API traffic.
    ApiCall,
    /// Direct messages.
    Message,
    /// Login and credential checks.
    Login,
}

impl Action {
    /// Every known action, in declaration order.
    pub const ALL: [Action; 7] = [
        Action::ContentGeneration,
        Action::BulletinPost,
        Action::LocationUpdate,
        Action::PhotoUpload,
        Action::ApiCall,
        Action::Message,
        Action::Login,
    ];

    /// Returns the canonical snake_case name used in store keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ContentGeneration => "content_generation",
            Action::BulletinPost => "bulletin_post",
            Action::LocationUpdate => "location_update",
            Action::PhotoUpload => "photo_upload",
            Action::ApiCall => "api_call",
            Action::Message => "message",
            Action::Login => "login",
        }
    }

    /// Returns true for authentication paths.
    pub fn is_auth(&self) -> bool {
        matches!(self, Action::Login)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raised when a caller names an action that has no configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
