//! Configuration error types

use thiserror::Error;

use crate::domain::rate_limit::Action;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid store timeout")]
    InvalidTimeout,

    #[error("Invalid limits for action '{action}': {reason}")]
    InvalidActionLimits { action: Action, reason: &'static str },

    #[error("Adaptive weights must sum to 1.0, got {0}")]
    AdaptiveWeightsSum(f64),

    #[error("Adaptive min_capacity_multiplier exceeds max_capacity_multiplier")]
    InvertedMultiplierBounds,

    #[error("{0} must be within [0, 1]")]
    ThresholdOutOfRange(&'static str),

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("Escalation tier severity {0} is outside 1..=5")]
    InvalidSeverity(u8),
}
