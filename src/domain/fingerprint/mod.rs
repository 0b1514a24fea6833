//! Device fingerprint domain - identity correlation and risk heuristics.
//!
//! A fingerprint is a heuristic digest of request headers and a salted IP
//! hash. Collisions between legitimate users behind one NAT are expected and
//! absorbed by the multi-user threshold.

mod hash;
mod heuristics;
mod risk;
mod status;

pub use hash::{hash_ip, FingerprintHash, HeaderSnapshot};
pub use heuristics::{default_bot_patterns, inspect_headers, Evaluation, SuspicionReason};
pub use risk::{risk_score, RiskFactors, RiskWeights};
pub use status::{BlockStatus, DeviceAnalysis, DeviceStats, MultiUserCheck, MAX_BLOCK_SECS};
