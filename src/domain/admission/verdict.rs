use http::StatusCode;
use serde::Serialize;
use std::fmt;

use crate::domain::fingerprint::FingerprintHash;
use crate::domain::throttle::FULL_VISIBILITY;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    DeviceBlocked,
    DeviceRisk,
    RateLimited,
    CostLimitExceeded,
    EmergencyStop,
    StoreUnavailable,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::DeviceBlocked => "device_blocked",
            DenialReason::DeviceRisk => "device_risk",
            DenialReason::RateLimited => "rate_limited",
            DenialReason::CostLimitExceeded => "cost_limit_exceeded",
            DenialReason::EmergencyStop => "emergency_stop",
            DenialReason::StoreUnavailable => "store_unavailable",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            DenialReason::DeviceBlocked | DenialReason::DeviceRisk => StatusCode::FORBIDDEN,
            DenialReason::RateLimited | DenialReason::CostLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            DenialReason::EmergencyStop | DenialReason::StoreUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one admission decision.
///
/// `visibility_multiplier` is for ranking only and must never reach the end user.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allowed: bool,
    pub http_status: StatusCode,
    pub reason: Option<DenialReason>,
    /// Operator-facing explanation (block reason, limit details).
    pub message: Option<String>,
    pub retry_after_secs: Option<f64>,
    pub visibility_multiplier: f64,
    pub fingerprint: Option<FingerprintHash>,
    /// True when a store failure was absorbed by a fail-open policy.
    pub degraded: bool,
}

impl Verdict {
    pub fn allow(visibility_multiplier: f64, fingerprint: Option<FingerprintHash>) -> Self {
        Self {
            allowed: true,
            http_status: StatusCode::OK,
            reason: None,
            message: None,
            retry_after_secs: None,
            visibility_multiplier,
            fingerprint,
            degraded: false,
        }
    }

    /// Fail-open admit after a store failure.
    pub fn degraded(fingerprint: Option<FingerprintHash>) -> Self {
        Self {
            degraded: true,
            ..Self::allow(FULL_VISIBILITY, fingerprint)
        }
    }

    pub fn deny(reason: DenialReason, fingerprint: Option<FingerprintHash>) -> Self {
        Self {
            allowed: false,
            http_status: reason.http_status(),
            reason: Some(reason),
            message: None,
            retry_after_secs: None,
            visibility_multiplier: FULL_VISIBILITY,
            fingerprint,
            degraded: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_retry_after(mut self, secs: f64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Whole seconds for a `Retry-After` header, rounded up, at least 1.
    pub fn retry_after_header(&self) -> Option<u64> {
        self.retry_after_secs.map(|secs| {
            if secs.is_finite() {
                secs.ceil().max(1.0) as u64
            } else {
                u64::MAX
            }
        })
    }
}
