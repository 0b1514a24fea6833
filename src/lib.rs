//! Trustgate - admission control for sensitive write paths.
//!
//! Three engines share one atomic key-value store: a token-bucket rate
//! governor, a device fingerprint risk engine and a shadow throttle engine
//! that lowers a flagged user's reach without telling them. The admission
//! orchestrator runs them as one pipeline and returns a single verdict.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
