//! Application configuration module
//!
//! Type-safe configuration loaded with the `config` and `dotenvy` crates.
//! Sources are layered, later ones winning:
//!
//! 1. Built-in defaults (every section has them)
//! 2. Optional TOML file at `$TRUSTGATE_CONFIG` (default `trustgate.toml`)
//! 3. Environment variables with the `TRUSTGATE` prefix, `__` between levels
//!
//! # Example
//!
//! ```no_run
//! use trustgate::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod admission;
mod database;
mod environment;
mod error;
mod fingerprint;
mod logging;
mod rate_limit;
mod redis;
mod store;
mod throttle;

pub use admission::AdmissionConfig;
pub use database::DatabaseConfig;
pub use environment::Environment;
pub use error::{ConfigError, ValidationError};
pub use fingerprint::FingerprintConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use rate_limit::{ActionTable, RateLimitConfig};
pub use redis::RedisConfig;
pub use store::{StoreBackend, StoreConfig};
pub use throttle::ThrottleConfig;

use serde::{Deserialize, Serialize};

/// Environment variable naming the optional TOML file
pub const CONFIG_PATH_VAR: &str = "TRUSTGATE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "trustgate.toml";

/// Root application configuration
///
/// Load using [`AppConfig::load()`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Redis configuration (shared atomic store)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Database configuration (shadow throttle rows)
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Store timeouts, retries and backend choice
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub admission: AdmissionConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Environment Variable Format
    ///
    /// - `TRUSTGATE__REDIS__URL=redis://...` -> `redis.url`
    /// - `TRUSTGATE__RATE_LIMIT__ACTIONS__LOGIN__CAPACITY=3` -> one field of one action
    /// - `TRUSTGATE__ADMISSION__FAIL_CLOSED_ACTIONS=login,message` -> list
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or a value cannot be
    /// parsed into its expected type.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(&path)
    }

    /// Same as [`AppConfig::load`] with an explicit file path. The file may be absent.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;

        let config = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("TRUSTGATE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admission.fail_closed_actions")
                    .with_list_parse_key("admission.trusted_proxies")
                    .with_list_parse_key("fingerprint.bot_user_agent_patterns"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Run once at startup. A configuration that fails here must not serve
    /// traffic.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.redis.validate()?;
        self.database.validate()?;
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.fingerprint.validate(self.is_production())?;
        self.throttle.validate()?;
        self.admission.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}
