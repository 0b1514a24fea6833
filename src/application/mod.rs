//! Application layer - engines, the admission pipeline and moderation handlers.
//!
//! Engines own the rules for one concern each and talk to ports only. The
//! orchestrator composes them; handlers expose administrative commands.

pub mod admission;
pub mod fingerprint;
pub mod handlers;
pub mod rate_limiter;
pub mod throttle;

pub use admission::AdmissionOrchestrator;
pub use fingerprint::DeviceFingerprintEngine;
pub use handlers::moderation::{
    ApplyThrottleCommand, ApplyThrottleHandler, BlockDeviceCommand, BlockDeviceHandler,
    GetTrustStatsHandler, GetTrustStatsQuery, ListActiveThrottlesHandler,
    ListActiveThrottlesQuery, ModerationError, RemovalTarget, RemoveThrottleCommand,
    RemoveThrottleHandler, TrustStats, UnblockDeviceCommand, UnblockDeviceHandler,
};
pub use rate_limiter::{
    ActionBucketStats, LimitDecision, LimitDenial, RateLimitStats, TokenBucketLimiter,
    CONTENTION_RETRY_SECS,
};
pub use throttle::{ShadowThrottleEngine, UserThrottleStats};
