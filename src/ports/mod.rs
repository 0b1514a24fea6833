//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `KeyValueStore` - Shared atomic counter/set/TTL store (Redis-shaped)
//! - `Clock` - Source of the current time
//! - `ThrottleRepository` - Durable shadow throttle rows

mod clock;
mod kv_store;
mod throttle_repository;

pub use clock::Clock;
pub use kv_store::{atomic_update, KeyValueStore, StoreError};
pub use throttle_repository::ThrottleRepository;
