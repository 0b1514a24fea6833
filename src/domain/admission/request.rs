use std::fmt;

use crate::domain::fingerprint::{FingerprintHash, HeaderSnapshot};
use crate::domain::rate_limit::{AdaptiveSignals, CostHints};

/// Subjects with this prefix are keyed by device, not by account.
pub const ANONYMOUS_SUBJECT_PREFIX: &str = "anon:";

/// Rate-limit subject for a caller without an account.
pub fn anonymous_subject(fingerprint: &FingerprintHash) -> String {
    format!("{}{}", ANONYMOUS_SUBJECT_PREFIX, fingerprint.short())
}

/// Everything the pipeline needs to know about one inbound request.
///
/// `client_ip` is held only for hashing and is redacted from `Debug`.
#[derive(Clone, Default)]
pub struct RequestContext {
    pub headers: HeaderSnapshot,
    pub client_ip: Option<String>,
    pub cost: CostHints,
    /// Caller-supplied trust in `[0, 1]`, higher is more trusted.
    pub trust_score: Option<f64>,
    /// Current system load in `[0, 1]`, higher is busier.
    pub system_load: Option<f64>,
}

impl RequestContext {
    pub fn new(headers: HeaderSnapshot, client_ip: Option<String>) -> Self {
        Self {
            headers,
            client_ip,
            ..Self::default()
        }
    }

    pub fn with_cost(mut self, cost: CostHints) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_trust_score(mut self, trust_score: f64) -> Self {
        self.trust_score = Some(trust_score);
        self
    }

    pub fn with_system_load(mut self, system_load: f64) -> Self {
        self.system_load = Some(system_load);
        self
    }

    /// Adaptive inputs, with behaviour supplied by the caller (device risk).
    pub fn adaptive_signals(&self, behavior: Option<f64>) -> AdaptiveSignals {
        AdaptiveSignals {
            trust: self.trust_score,
            load: self.system_load,
            behavior,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("headers", &self.headers)
            .field("client_ip", &self.client_ip.as_ref().map(|_| "[redacted]"))
            .field("cost", &self.cost)
            .field("trust_score", &self.trust_score)
            .field("system_load", &self.system_load)
            .finish()
    }
}
