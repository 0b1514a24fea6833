//! Rate limit domain - token bucket math and its inputs.
//!
//! Everything here is pure: state comes in, a decision and the next state
//! come out. Persistence and atomicity live behind the store port.

mod action;
mod activity;
mod adaptive;
mod bucket;
mod cost;
mod spend;

pub use action::{Action, UnknownAction};
pub use activity::{
    ActivityFlag, HitHistory, SuspiciousActivity, HIT_HISTORY_LEN, HIT_HISTORY_TTL_SECS,
    MAX_LIMITED_ACTIONS, RAPID_HIT_WINDOW_SECS,
};
pub use adaptive::{AdaptiveConfig, AdaptiveSignals, AdaptiveWeights};
pub use bucket::{BucketLimits, BucketState, BucketStatus, ConsumeDecision};
pub use cost::{request_cost, CostHints, LARGE_CONTENT_CHARS, LARGE_UPLOAD_BYTES};
pub use spend::{SpendConfig, SpendLedger, MICROS_PER_UNIT};
