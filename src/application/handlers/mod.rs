//! Application handlers.
//!
//! Command and query handlers for the moderation console.

pub mod moderation;
