use serde::{Deserialize, Serialize};

/// What an action does when the shared store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit, marking the verdict as degraded.
    Open,
    /// Deny with `store_unavailable`.
    Closed,
}

impl FailurePolicy {
    pub fn admits(&self) -> bool {
        matches!(self, FailurePolicy::Open)
    }
}
