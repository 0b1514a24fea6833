//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `rate_limit` - Token bucket arithmetic, adaptive scaling, spend ledger
//! - `fingerprint` - Device digest derivation, suspicion heuristics, risk score
//! - `throttle` - Severity table, penalty records, escalation curves
//! - `admission` - Request context, failure policy and verdicts

pub mod admission;
pub mod fingerprint;
pub mod foundation;
pub mod rate_limit;
pub mod throttle;
