//! Timeout and retry decorator for any `KeyValueStore`.
//!
//! Every call is bounded by a timeout. Idempotent calls that fail with a
//! transient error are retried; `increment` and `compare_and_swap` are not,
//! because a timed-out attempt may already have been applied.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::ports::{KeyValueStore, StoreError};

pub struct ResilientStore {
    inner: Arc<dyn KeyValueStore>,
    timeout: Duration,
    retries: u32,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, timeout: Duration, retries: u32) -> Self {
        Self {
            inner,
            timeout,
            retries,
        }
    }

    async fn guarded<T, F, Fut>(&self, op: &'static str, idempotent: bool, call: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let attempts = if idempotent { 1 + self.retries } else { 1 };
        let mut last = StoreError::Unavailable(format!("{} was not attempted", op));

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() => last = e,
                Ok(Err(e)) => return Err(e),
                Err(_) => last = StoreError::Timeout(self.timeout),
            }
            if attempt < attempts {
                tracing::debug!(op, attempt, error = %last, "retrying store call");
            }
        }
        Err(last)
    }
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for ResilientStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.guarded("get", true, move || self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.guarded("set", true, move || self.inner.set(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.guarded("delete", true, move || self.inner.delete(key)).await
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64, StoreError> {
        self.guarded("increment", false, move || self.inner.increment(key, delta, ttl))
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.guarded("ttl", true, move || self.inner.ttl(key)).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.guarded("set_add", true, move || self.inner.set_add(key, member, ttl))
            .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.guarded("set_members", true, move || self.inner.set_members(key))
            .await
    }

    async fn set_card(&self, key: &str) -> Result<usize, StoreError> {
        self.guarded("set_card", true, move || self.inner.set_card(key)).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.guarded("compare_and_swap", false, move || {
            self.inner.compare_and_swap(key, expected, new, ttl)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.guarded("scan_prefix", true, move || self.inner.scan_prefix(prefix))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.guarded("ping", true, move || self.inner.ping()).await
    }
}
