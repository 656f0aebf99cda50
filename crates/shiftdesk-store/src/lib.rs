//! Key-value store access for shiftdesk
//!
//! Sessions, cache entries and realtime connection descriptors all live in one
//! shared key-value store. This crate provides:
//!
//! - [`KeyValueStore`]: the async store abstraction
//! - [`RedisStore`]: pooled Redis backend (deadpool-redis)
//! - [`InMemoryStore`]: process-local backend with Redis-like semantics
//! - [`StoreClient`]: the shared handle with health checks and blocking access
//! - [`RetryPolicy`]: exponential backoff for writes that must not be lost

pub mod client;
pub mod error;
pub mod in_memory;
pub mod redis_backend;
pub mod retry;
pub mod store;

pub use client::StoreClient;
pub use error::{StoreError, StoreResult};
pub use in_memory::InMemoryStore;
pub use redis_backend::RedisStore;
pub use retry::{RetryError, RetryPolicy};
pub use store::KeyValueStore;
