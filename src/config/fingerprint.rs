//! Device fingerprint configuration

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::fingerprint::{default_bot_patterns, RiskWeights};

/// Device fingerprint configuration
///
/// Not `Clone`: the IP salt lives in a `SecretString`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Namespace for device keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Salt mixed into every IP hash. Required in production.
    #[serde(default = "empty_secret", skip_serializing)]
    pub server_secret: SecretString,

    #[serde(default = "default_max_users")]
    pub max_users_per_device: usize,

    #[serde(default = "default_max_requests")]
    pub max_requests_per_minute: u64,

    /// Block length, also the lifetime of a device's user set
    #[serde(default = "default_block_duration")]
    pub device_block_duration_secs: u64,

    /// How long a suspicious evaluation keeps counting toward risk
    #[serde(default = "default_suspicion_ttl")]
    pub suspicion_ttl_secs: u64,

    #[serde(default = "default_bot_patterns")]
    pub bot_user_agent_patterns: Vec<String>,

    #[serde(default)]
    pub risk: RiskWeights,
}

impl FingerprintConfig {
    pub fn device_block_duration(&self) -> Duration {
        Duration::from_secs(self.device_block_duration_secs)
    }

    pub fn suspicion_ttl(&self) -> Duration {
        Duration::from_secs(self.suspicion_ttl_secs)
    }

    pub fn has_secret(&self) -> bool {
        !self.server_secret.expose_secret().is_empty()
    }

    /// Validate fingerprint configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.key_prefix.is_empty() {
            return Err(ValidationError::MissingRequired("FINGERPRINT__KEY_PREFIX"));
        }
        if production && !self.has_secret() {
            return Err(ValidationError::MissingRequired("FINGERPRINT__SERVER_SECRET"));
        }
        if self.max_users_per_device == 0 {
            return Err(ValidationError::NonPositive("fingerprint.max_users_per_device"));
        }
        if self.max_requests_per_minute == 0 {
            return Err(ValidationError::NonPositive("fingerprint.max_requests_per_minute"));
        }
        if self.device_block_duration_secs == 0 {
            return Err(ValidationError::NonPositive(
                "fingerprint.device_block_duration_secs",
            ));
        }
        if self.suspicion_ttl_secs == 0 {
            return Err(ValidationError::NonPositive("fingerprint.suspicion_ttl_secs"));
        }
        Ok(())
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            server_secret: empty_secret(),
            max_users_per_device: default_max_users(),
            max_requests_per_minute: default_max_requests(),
            device_block_duration_secs: default_block_duration(),
            suspicion_ttl_secs: default_suspicion_ttl(),
            bot_user_agent_patterns: default_bot_patterns(),
            risk: RiskWeights::default(),
        }
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_key_prefix() -> String {
    "device_fingerprint".to_string()
}

fn default_max_users() -> usize {
    3
}

fn default_max_requests() -> u64 {
    60
}

fn default_block_duration() -> u64 {
    7200
}

fn default_suspicion_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_defaults() {
        let config = FingerprintConfig::default();
        assert_eq!(config.max_users_per_device, 3);
        assert_eq!(config.max_requests_per_minute, 60);
        assert_eq!(config.device_block_duration(), Duration::from_secs(7200));
        assert!(config.bot_user_agent_patterns.contains(&"headless".to_string()));
    }

    #[test]
    fn test_secret_required_in_production_only() {
        let config = FingerprintConfig::default();
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.validate(true),
            Err(ValidationError::MissingRequired("FINGERPRINT__SERVER_SECRET"))
        );

        let salted = FingerprintConfig {
            server_secret: SecretString::new("pepper".to_string()),
            ..Default::default()
        };
        assert!(salted.validate(true).is_ok());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = FingerprintConfig {
            server_secret: SecretString::new("pepper-value".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("pepper-value"));
    }
}
