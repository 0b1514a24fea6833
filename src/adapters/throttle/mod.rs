//! Shadow throttle repository adapters.
//!
//! - `InMemoryThrottleRepository` - For tests and single-process runs
//! - `PostgresThrottleRepository` - `shadow_throttles` table via sqlx

mod in_memory;
mod postgres;

pub use in_memory::InMemoryThrottleRepository;
pub use postgres::PostgresThrottleRepository;
