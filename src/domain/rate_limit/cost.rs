use serde::{Deserialize, Serialize};

use super::{Action, BucketLimits};

/// Content longer than this many characters costs one extra token.
pub const LARGE_CONTENT_CHARS: usize = 1000;

/// Uploads larger than this many bytes cost one extra token.
pub const LARGE_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Request attributes that change what a single call costs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostHints {
    /// Character count of submitted content.
    pub content_length: Option<usize>,
    /// Size of an uploaded file.
    pub file_size_bytes: Option<u64>,
    /// Monetary cost of this specific call, overriding the action default.
    pub monetary_cost: Option<f64>,
    /// Token cost that replaces every other rule.
    pub cost_override: Option<f64>,
}

/// Effective token cost of one call.
pub fn request_cost(action: Action, limits: &BucketLimits, hints: &CostHints) -> f64 {
    if let Some(cost) = hints.cost_override {
        return cost.max(0.0);
    }

    let mut cost = limits.cost_per_request;
    match action {
        Action::ContentGeneration => {
            if hints.content_length.is_some_and(|len| len > LARGE_CONTENT_CHARS) {
                cost += 1.0;
            }
        }
        Action::PhotoUpload => {
            if hints.file_size_bytes.is_some_and(|size| size > LARGE_UPLOAD_BYTES) {
                cost += 1.0;
            }
        }
        _ => {}
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_request_costs_the_configured_amount() {
        let limits = BucketLimits::for_action(Action::PhotoUpload);
        assert_eq!(request_cost(Action::PhotoUpload, &limits, &CostHints::default()), 2.0);
    }

    #[test]
    fn long_content_costs_one_more() {
        let limits = BucketLimits::for_action(Action::ContentGeneration);
        let hints = CostHints {
            content_length: Some(1001),
            ..CostHints::default()
        };
        assert_eq!(request_cost(Action::ContentGeneration, &limits, &hints), 2.0);

        let boundary = CostHints {
            content_length: Some(1000),
            ..CostHints::default()
        };
        assert_eq!(request_cost(Action::ContentGeneration, &limits, &boundary), 1.0);
    }

    #[test]
    fn large_upload_costs_one_more() {
        let limits = BucketLimits::for_action(Action::PhotoUpload);
        let hints = CostHints {
            file_size_bytes: Some(LARGE_UPLOAD_BYTES + 1),
            ..CostHints::default()
        };
        assert_eq!(request_cost(Action::PhotoUpload, &limits, &hints), 3.0);
    }

    #[test]
    fn hints_for_other_actions_are_ignored() {
        let limits = BucketLimits::for_action(Action::Message);
        let hints = CostHints {
            content_length: Some(50_000),
            file_size_bytes: Some(LARGE_UPLOAD_BYTES * 4),
            ..CostHints::default()
        };
        assert_eq!(request_cost(Action::Message, &limits, &hints), 1.0);
    }

    #[test]
    fn override_wins() {
        let limits = BucketLimits::for_action(Action::ContentGeneration);
        let hints = CostHints {
            content_length: Some(5000),
            cost_override: Some(4.0),
            ..CostHints::default()
        };
        assert_eq!(request_cost(Action::ContentGeneration, &limits, &hints), 4.0);
    }
}
