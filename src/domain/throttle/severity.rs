use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Visibility of a user with no active throttle.
pub const FULL_VISIBILITY: f64 = 1.0;

/// Multiplier used when a stored level falls outside 1..=5.
const UNKNOWN_LEVEL_VISIBILITY: f64 = 0.50;

/// Throttle severity, 1 (mildest) to 5 (harshest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(ValidationError::out_of_range(
                "severity",
                Self::MIN as i32,
                Self::MAX as i32,
                level as i32,
            ));
        }
        Ok(Self(level))
    }

    /// Clamps any integer into 1..=5.
    pub fn saturating(level: i64) -> Self {
        Self(level.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn visibility_multiplier(&self) -> f64 {
        visibility_for_level(self.0 as i32)
    }
}

/// Fixed severity table. Each step roughly halves visibility.
pub fn visibility_for_level(level: i32) -> f64 {
    match level {
        1 => 0.70,
        2 => 0.50,
        3 => 0.30,
        4 => 0.15,
        5 => 0.05,
        _ => UNKNOWN_LEVEL_VISIBILITY,
    }
}

impl TryFrom<u8> for Severity {
    type Error = ValidationError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
