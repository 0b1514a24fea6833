//! Suspicious-activity assessment over a subject's rate limit history.
//!
//! Two patterns are flagged: many actions exhausted at once, and a tight
//! burst of denials. The history of recent denials is a short JSON list of
//! unix millisecond stamps kept in the shared store.

use serde::Serialize;

use super::Action;
use crate::domain::foundation::Timestamp;

/// Denials remembered per subject.
pub const HIT_HISTORY_LEN: usize = 10;

/// How long the denial history survives without a new denial.
pub const HIT_HISTORY_TTL_SECS: u64 = 300;

/// A full history inside this window counts as a rapid burst.
pub const RAPID_HIT_WINDOW_SECS: i64 = 60;

/// More exhausted actions than this at once is suspicious.
pub const MAX_LIMITED_ACTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityFlag {
    /// More than [`MAX_LIMITED_ACTIONS`] buckets are empty simultaneously.
    ManyActionsLimited,
    /// [`HIT_HISTORY_LEN`] denials landed within [`RAPID_HIT_WINDOW_SECS`].
    RapidLimitHits,
}

impl ActivityFlag {
    pub fn describe(&self) -> &'static str {
        match self {
            ActivityFlag::ManyActionsLimited => "multiple actions rate limited simultaneously",
            ActivityFlag::RapidLimitHits => "rapid successive rate limit hits",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousActivity {
    pub suspicious: bool,
    pub reasons: Vec<ActivityFlag>,
    pub limited_actions: Vec<Action>,
}

impl SuspiciousActivity {
    pub fn assess(limited_actions: Vec<Action>, history: &HitHistory) -> Self {
        let mut reasons = Vec::new();
        if limited_actions.len() > MAX_LIMITED_ACTIONS {
            reasons.push(ActivityFlag::ManyActionsLimited);
        }
        if history.is_rapid() {
            reasons.push(ActivityFlag::RapidLimitHits);
        }
        Self {
            suspicious: !reasons.is_empty(),
            reasons,
            limited_actions,
        }
    }
}

/// Most recent denial stamps, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitHistory {
    hits: Vec<i64>,
}

impl HitHistory {
    /// Parses the stored list. Missing means no history; garbage is `None`.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            None => Some(Self::default()),
            Some(value) => serde_json::from_str::<Vec<i64>>(value)
                .ok()
                .map(|hits| Self { hits }),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(&self.hits).unwrap_or_else(|_| "[]".to_string())
    }

    /// History with `at` appended, keeping the last [`HIT_HISTORY_LEN`].
    pub fn record(&self, at: Timestamp) -> Self {
        let mut hits = self.hits.clone();
        hits.push(at.as_unix_millis());
        let excess = hits.len().saturating_sub(HIT_HISTORY_LEN);
        hits.drain(..excess);
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    fn is_rapid(&self) -> bool {
        if self.hits.len() < HIT_HISTORY_LEN {
            return false;
        }
        match (self.hits.first(), self.hits.last()) {
            (Some(first), Some(last)) => last - first < RAPID_HIT_WINDOW_SECS * 1000,
            _ => false,
        }
    }
}
