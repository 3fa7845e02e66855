//! # Flood Infrastructure
//!
//! Concrete implementations of the `CounterStore` port defined in `flood-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory store only
//! - `redis` - Redis-backed counter store

pub mod store;

// Re-exports - In-Memory
pub use store::InMemoryCounterStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore, RedisCounterStoreConfig};
