//! Shared key-value store port.
//!
//! Every engine keeps its state here so replicas stay stateless. Each
//! operation must be atomic on its own; read-modify-write sequences go
//! through [`atomic_update`], which retries on a lost compare-and-swap.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Port for the shared atomic store.
///
/// Implementations must be safe to call concurrently from many replicas.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value`, replacing any TTL with `ttl` (or none).
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns true if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds `delta` to an integer counter, creating it at zero.
    ///
    /// `ttl` is applied when the increment creates the key.
    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64, StoreError>;

    /// Remaining lifetime, `None` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Adds a set member and refreshes the set's TTL. Returns true if new.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn set_card(&self, key: &str) -> Result<usize, StoreError>;

    /// Writes `new` only if the current value equals `expected`
    /// (`None` = key must be absent). Returns false if the swap lost.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Live keys beginning with `prefix`, sorted. Not a snapshot: keys
    /// written during the scan may or may not appear.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Errors from store operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("gave up on '{key}' after {attempts} contended attempts")]
    Contention { key: String, attempts: u32 },
}

impl StoreError {
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Infrastructure failures that may succeed on a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Optimistic read-compute-swap loop.
///
/// `compute` receives the current value and returns the value to write
/// (`None` = leave untouched) plus the caller's output. It may run more than
/// once and must be free of side effects.
pub async fn atomic_update<S, F, T>(
    store: &S,
    key: &str,
    ttl: Option<Duration>,
    max_attempts: u32,
    mut compute: F,
) -> Result<T, StoreError>
where
    S: KeyValueStore + ?Sized,
    F: FnMut(Option<&str>) -> Result<(Option<String>, T), StoreError> + Send,
    T: Send,
{
    let attempts = max_attempts.max(1);
    for _ in 0..attempts {
        let current = store.get(key).await?;
        let (next, output) = compute(current.as_deref())?;
        let Some(next) = next else {
            return Ok(output);
        };
        if store
            .compare_and_swap(key, current.as_deref(), &next, ttl)
            .await?
        {
            return Ok(output);
        }
    }
    Err(StoreError::Contention {
        key: key.to_string(),
        attempts,
    })
}
