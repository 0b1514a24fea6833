//! Admission pipeline configuration

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::error::ValidationError;
use crate::domain::admission::FailurePolicy;
use crate::domain::rate_limit::Action;

/// Admission pipeline configuration
///
/// The single place that decides what happens when the store is down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Suspicious devices at or above this risk are blocked automatically
    #[serde(default = "default_auto_block_threshold")]
    pub auto_block_threshold: f64,

    /// Actions that deny when the store cannot answer; all others admit
    #[serde(default = "default_fail_closed_actions")]
    pub fail_closed_actions: Vec<Action>,

    /// Socket peers whose `X-Forwarded-For` and `X-Real-IP` headers are
    /// believed. Empty means the socket address is the client.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl AdmissionConfig {
    pub fn failure_policy(&self, action: Action) -> FailurePolicy {
        if self.fail_closed_actions.contains(&action) {
            FailurePolicy::Closed
        } else {
            FailurePolicy::Open
        }
    }

    /// Validate admission configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.auto_block_threshold) {
            return Err(ValidationError::ThresholdOutOfRange(
                "admission.auto_block_threshold",
            ));
        }
        Ok(())
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            auto_block_threshold: default_auto_block_threshold(),
            fail_closed_actions: default_fail_closed_actions(),
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_auto_block_threshold() -> f64 {
    0.8
}

fn default_fail_closed_actions() -> Vec<Action> {
    Action::ALL.into_iter().filter(Action::is_auth).collect()
}
