//! Storage implementations for the payment pipeline.
//!
//! - **In-memory** - clock-driven expiry, for tests and single-process use
//! - **Redis** - durable, TTL-bounded, atomic idempotency claims

pub mod memory;
pub mod redis;

// Re-exports
pub use memory::InMemoryStore;
pub use self::redis::RedisStore;
