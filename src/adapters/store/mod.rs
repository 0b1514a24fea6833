//! Key-value store adapters.
//!
//! ## Available Adapters
//!
//! - `InMemoryKeyValueStore` - Single-process store for tests and local runs
//! - `RedisKeyValueStore` - Redis-backed store for multi-replica deployments
//! - `ResilientStore` - Timeout and retry decorator over any store

mod in_memory;
mod redis;
mod resilient;

pub use in_memory::InMemoryKeyValueStore;
pub use redis::RedisKeyValueStore;
pub use resilient::ResilientStore;
