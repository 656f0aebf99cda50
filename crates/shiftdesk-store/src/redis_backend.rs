//! Redis store backend
//!
//! Provides a Redis-backed [`KeyValueStore`] with connection pooling.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use shiftdesk_conf::StoreSettings;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;

/// Number of keys to scan per iteration
const SCAN_BATCH_SIZE: usize = 100;

/// Redis store with connection pooling
///
/// Uses deadpool-redis for connection management. Every command, including the
/// wait for a pooled connection, is bounded by the configured socket timeout.
#[derive(Clone)]
pub struct RedisStore {
	pool: Pool,
	command_timeout: Duration,
}

impl RedisStore {
	/// Create a pooled store from settings
	///
	/// Pool size comes from `max_pool_size`; wait, create and recycle timeouts
	/// use the connect timeout.
	///
	/// # Examples
	///
	/// ```no_run
	/// use shiftdesk_conf::StoreSettings;
	/// use shiftdesk_store::RedisStore;
	///
	/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
	/// let store = RedisStore::from_settings(&StoreSettings::default())?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn from_settings(settings: &StoreSettings) -> StoreResult<Self> {
		let mut config = PoolConfig::from_url(settings.url());
		let mut pool_config = deadpool_redis::PoolConfig::new(settings.max_pool_size);
		pool_config.timeouts.wait = Some(settings.connect_timeout());
		pool_config.timeouts.create = Some(settings.connect_timeout());
		pool_config.timeouts.recycle = Some(settings.connect_timeout());
		config.pool = Some(pool_config);

		let pool = config
			.create_pool(Some(Runtime::Tokio1))
			.map_err(|e| StoreError::Pool(format!("Failed to create Redis pool: {}", e)))?;

		Ok(Self::with_pool(pool, settings.socket_timeout()))
	}

	/// Wrap an existing pool
	pub fn with_pool(pool: Pool, command_timeout: Duration) -> Self {
		Self {
			pool,
			command_timeout,
		}
	}

	/// Get the connection pool
	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	/// Check out a pooled connection
	pub async fn connection(&self) -> StoreResult<deadpool_redis::Connection> {
		self.pool
			.get()
			.await
			.map_err(|e| StoreError::Pool(format!("Failed to get connection from pool: {}", e)))
	}

	async fn bounded<T>(
		&self,
		operation: &'static str,
		fut: impl Future<Output = StoreResult<T>>,
	) -> StoreResult<T> {
		match tokio::time::timeout(self.command_timeout, fut).await {
			Ok(result) => result,
			Err(_) => Err(StoreError::Timeout {
				operation,
				timeout: self.command_timeout,
			}),
		}
	}
}

/// Redis rejects `EX 0`; sub-second TTLs round up to one second
fn ttl_seconds(ttl: Duration) -> u64 {
	ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
	async fn get(&self, key: &str) -> StoreResult<Option<String>> {
		self.bounded("GET", async {
			let mut conn = self.connection().await?;
			let value: Option<String> = conn
				.get(key)
				.await
				.map_err(|e| StoreError::from_redis("GET", e))?;
			Ok(value)
		})
		.await
	}

	async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
		self.bounded("SET", async {
			let mut conn = self.connection().await?;
			match ttl {
				Some(ttl) => {
					let _: () = conn
						.set_ex(key, value, ttl_seconds(ttl))
						.await
						.map_err(|e| StoreError::from_redis("SET", e))?;
				}
				None => {
					let _: () = conn
						.set(key, value)
						.await
						.map_err(|e| StoreError::from_redis("SET", e))?;
				}
			}
			Ok(())
		})
		.await
	}

	async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
		if keys.is_empty() {
			return Ok(0);
		}
		self.bounded("DEL", async {
			let mut conn = self.connection().await?;
			let removed: u64 = conn
				.del(keys.to_vec())
				.await
				.map_err(|e| StoreError::from_redis("DEL", e))?;
			Ok(removed)
		})
		.await
	}

	async fn exists(&self, key: &str) -> StoreResult<bool> {
		self.bounded("EXISTS", async {
			let mut conn = self.connection().await?;
			let exists: bool = conn
				.exists(key)
				.await
				.map_err(|e| StoreError::from_redis("EXISTS", e))?;
			Ok(exists)
		})
		.await
	}

	async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
		self.bounded("SCAN", async {
			let mut conn = self.connection().await?;
			// SCAN may return a key more than once
			let mut found = HashSet::new();
			let mut cursor: u64 = 0;

			loop {
				let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
					.arg(cursor)
					.arg("MATCH")
					.arg(pattern)
					.arg("COUNT")
					.arg(SCAN_BATCH_SIZE)
					.query_async(&mut *conn)
					.await
					.map_err(|e| StoreError::from_redis("SCAN", e))?;

				found.extend(keys);

				cursor = next_cursor;
				if cursor == 0 {
					break;
				}
			}

			Ok(found.into_iter().collect())
		})
		.await
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
		self.bounded("HSET", async {
			let mut conn = self.connection().await?;
			let _: () = conn
				.hset(key, field, value)
				.await
				.map_err(|e| StoreError::from_redis("HSET", e))?;
			Ok(())
		})
		.await
	}

	async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
		if fields.is_empty() {
			return Ok(());
		}
		self.bounded("HSET", async {
			let mut conn = self.connection().await?;
			let _: () = conn
				.hset_multiple(key, fields)
				.await
				.map_err(|e| StoreError::from_redis("HSET", e))?;
			Ok(())
		})
		.await
	}

	async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
		self.bounded("HGETALL", async {
			let mut conn = self.connection().await?;
			let fields: HashMap<String, String> = conn
				.hgetall(key)
				.await
				.map_err(|e| StoreError::from_redis("HGETALL", e))?;
			Ok(fields)
		})
		.await
	}

	async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
		self.bounded("SADD", async {
			let mut conn = self.connection().await?;
			let _: () = conn
				.sadd(key, member)
				.await
				.map_err(|e| StoreError::from_redis("SADD", e))?;
			Ok(())
		})
		.await
	}

	async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
		self.bounded("SREM", async {
			let mut conn = self.connection().await?;
			let _: () = conn
				.srem(key, member)
				.await
				.map_err(|e| StoreError::from_redis("SREM", e))?;
			Ok(())
		})
		.await
	}

	async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
		self.bounded("SMEMBERS", async {
			let mut conn = self.connection().await?;
			let members: Vec<String> = conn
				.smembers(key)
				.await
				.map_err(|e| StoreError::from_redis("SMEMBERS", e))?;
			Ok(members)
		})
		.await
	}

	async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
		self.bounded("EXPIRE", async {
			let mut conn = self.connection().await?;
			let applied: bool = conn
				.expire(key, ttl_seconds(ttl) as i64)
				.await
				.map_err(|e| StoreError::from_redis("EXPIRE", e))?;
			Ok(applied)
		})
		.await
	}

	async fn ping(&self) -> StoreResult<()> {
		self.bounded("PING", async {
			let mut conn = self
				.connection()
				.await
				.map_err(|e| StoreError::Unavailable(e.to_string()))?;
			let pong: String = redis::cmd("PING")
				.query_async(&mut *conn)
				.await
				.map_err(|e| StoreError::Unavailable(format!("PING failed: {}", e)))?;
			if pong == "PONG" {
				Ok(())
			} else {
				Err(StoreError::Unavailable(format!(
					"unexpected PING reply: {}",
					pong
				)))
			}
		})
		.await
	}

	fn backend_name(&self) -> &'static str {
		"redis"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(Duration::from_millis(1), 1)]
	#[case(Duration::from_millis(1500), 1)]
	#[case(Duration::from_secs(300), 300)]
	fn test_ttl_seconds_never_zero(#[case] ttl: Duration, #[case] expected: u64) {
		assert_eq!(ttl_seconds(ttl), expected);
	}

	#[rstest]
	#[tokio::test]
	async fn test_pool_creation_is_lazy() {
		let mut settings = StoreSettings::default();
		settings.port = 1;
		let store = RedisStore::from_settings(&settings).unwrap();
		assert_eq!(store.pool().status().max_size, settings.max_pool_size);
		assert_eq!(store.backend_name(), "redis");
	}
}
