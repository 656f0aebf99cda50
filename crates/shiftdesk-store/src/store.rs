//! Key-value store abstraction
//!
//! The operations mirror the Redis commands the services rely on
//! (GET, SET EX, DEL, EXISTS, SCAN, HSET, HGETALL, SADD, SREM, SMEMBERS, EXPIRE, PING).
//! Implementations must be safe to share between tasks; every call is an
//! independent round trip and no ordering is guaranteed across keys.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::StoreResult;

/// Shared key-value store
///
/// ## Example
///
/// ```rust
/// use shiftdesk_store::{InMemoryStore, KeyValueStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryStore::new();
///
/// store.set("greeting", "hello", Some(Duration::from_secs(60))).await?;
/// assert_eq!(store.get("greeting").await?, Some("hello".to_string()));
///
/// store.sadd("online", "alice").await?;
/// assert_eq!(store.smembers("online").await?, vec!["alice".to_string()]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	/// Get a string value
	async fn get(&self, key: &str) -> StoreResult<Option<String>>;

	/// Set a string value, replacing any previous TTL
	async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

	/// Delete keys, returning how many existed
	async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

	async fn exists(&self, key: &str) -> StoreResult<bool>;

	/// List keys matching a glob pattern
	async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>>;

	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

	async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

	async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

	async fn sadd(&self, key: &str, member: &str) -> StoreResult<()>;

	async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;

	async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

	/// Apply a TTL to an existing key; false when the key does not exist
	async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

	/// Round-trip health probe
	async fn ping(&self) -> StoreResult<()>;

	/// Short backend name used in log fields
	fn backend_name(&self) -> &'static str;

	/// Delete a single key, returning whether it existed
	async fn delete_one(&self, key: &str) -> StoreResult<bool> {
		Ok(self.delete(&[key.to_string()]).await? > 0)
	}
}
