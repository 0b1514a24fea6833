//! In-memory key-value store for testing and single-process deployments.
//!
//! One lock guards the whole map, so every operation is trivially atomic.
//! Expiry is evaluated lazily against the injected clock.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::adapters::clock::SystemClock;
use crate::domain::foundation::Timestamp;
use crate::ports::{Clock, KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn deadline(now: Timestamp, ttl: Duration) -> Timestamp {
    now.plus_secs_f64(ttl.as_secs_f64())
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::corrupt(key, "operation against a key holding the wrong kind of value")
}

/// In-memory store. Cloning shares the underlying map.
#[derive(Clone)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live keys (for testing).
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Removes every key (for testing).
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Timestamp,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyValueStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|ttl| deadline(now, ttl)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                let Value::Text(text) = &entry.value else {
                    return Err(wrong_type(key));
                };
                let current: i64 = text
                    .parse()
                    .map_err(|_| StoreError::corrupt(key, "value is not an integer"))?;
                let next = current.saturating_add(delta);
                entry.value = Value::Text(next.to_string());
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(deadline(now, ttl));
                }
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text(delta.to_string()),
                        expires_at: Some(deadline(now, ttl)),
                    },
                );
                Ok(delta)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let remaining = entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| {
                let millis = at.duration_since(&now).num_milliseconds().max(0);
                Duration::from_millis(millis as u64)
            });
        Ok(remaining)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                let Value::Set(members) = &mut entry.value else {
                    return Err(wrong_type(key));
                };
                let added = members.insert(member.to_string());
                entry.expires_at = Some(deadline(now, ttl));
                Ok(added)
            }
            None => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Set(members),
                        expires_at: Some(deadline(now, ttl)),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                let mut members: Vec<String> = members.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_card(&self, key: &str) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            None => Ok(0),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.len()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let current = match Self::live(&mut entries, key, now) {
            None => None,
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Some(text.as_str()),
            Some(_) => return Err(wrong_type(key)),
        };
        if current != expected {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(new.to_string()),
                expires_at: ttl.map(|ttl| deadline(now, ttl)),
            },
        );
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
