//! Store client
//!
//! [`StoreClient`] is the single handle the services share. It owns the
//! backing [`KeyValueStore`], the retry policy for writes, and (when backed by
//! Redis) the settings needed to open blocking connections.

use shiftdesk_conf::StoreSettings;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::redis_backend::RedisStore;
use crate::retry::RetryPolicy;
use crate::store::KeyValueStore;

#[derive(Clone)]
struct RedisHandles {
	store: RedisStore,
	client: redis::Client,
	connect_timeout: Duration,
	socket_timeout: Duration,
}

/// Shared store client
///
/// Cloning is cheap; clones share the pool.
///
/// # Examples
///
/// ```
/// use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
/// assert!(client.health_check().await);
/// # }
/// ```
#[derive(Clone)]
pub struct StoreClient {
	store: Arc<dyn KeyValueStore>,
	retry: RetryPolicy,
	redis: Option<RedisHandles>,
}

impl fmt::Debug for StoreClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StoreClient")
			.field("backend", &self.store.backend_name())
			.field("retry", &self.retry)
			.finish()
	}
}

impl StoreClient {
	/// Build a pooled Redis client and verify it answers PING
	///
	/// # Errors
	///
	/// Returns [`StoreError::Pool`] when the pool cannot be built and
	/// [`StoreError::Unavailable`] when the health check fails.
	pub async fn connect(settings: &StoreSettings) -> StoreResult<Self> {
		let store = RedisStore::from_settings(settings)?;
		let client = redis::Client::open(settings.url())
			.map_err(|e| StoreError::Pool(format!("Invalid Redis URL: {}", e)))?;

		let this = Self {
			store: Arc::new(store.clone()),
			retry: RetryPolicy::from_settings(&settings.retry),
			redis: Some(RedisHandles {
				store,
				client,
				connect_timeout: settings.connect_timeout(),
				socket_timeout: settings.socket_timeout(),
			}),
		};

		this.store.ping().await.map_err(|e| {
			tracing::error!(
				host = %settings.host,
				port = settings.port,
				db = settings.db,
				error = %e,
				"Redis health check failed"
			);
			e
		})?;

		tracing::info!(
			host = %settings.host,
			port = settings.port,
			db = settings.db,
			max_pool_size = settings.max_pool_size,
			"Connected to Redis"
		);
		Ok(this)
	}

	/// Wrap an arbitrary store
	pub fn from_store(store: Arc<dyn KeyValueStore>, retry: RetryPolicy) -> Self {
		Self {
			store,
			retry,
			redis: None,
		}
	}

	/// The backing store
	pub fn store(&self) -> &Arc<dyn KeyValueStore> {
		&self.store
	}

	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}

	pub fn backend_name(&self) -> &'static str {
		self.store.backend_name()
	}

	/// Close the Redis pool; later checkouts fail
	///
	/// A no-op for other backends. Affects every clone of this client.
	pub fn close(&self) {
		if let Some(handles) = &self.redis {
			handles.store.pool().close();
			tracing::info!("Redis pool closed");
		}
	}

	/// Check out a pooled async Redis connection
	///
	/// # Errors
	///
	/// Fails with [`StoreError::Unavailable`] when the client is not Redis-backed.
	pub async fn connection(&self) -> StoreResult<deadpool_redis::Connection> {
		match &self.redis {
			Some(handles) => handles.store.connection().await,
			None => Err(StoreError::Unavailable(format!(
				"{} store has no Redis connection",
				self.store.backend_name()
			))),
		}
	}

	/// Open a blocking Redis connection with read and write timeouts applied
	///
	/// Intended for code that runs outside the async runtime.
	pub fn sync_connection(&self) -> StoreResult<redis::Connection> {
		let handles = self.redis.as_ref().ok_or_else(|| {
			StoreError::Unavailable(format!(
				"{} store has no Redis connection",
				self.store.backend_name()
			))
		})?;

		let conn = handles
			.client
			.get_connection_with_timeout(handles.connect_timeout)
			.map_err(|e| StoreError::from_redis("CONNECT", e))?;
		conn.set_read_timeout(Some(handles.socket_timeout))
			.map_err(|e| StoreError::from_redis("CONNECT", e))?;
		conn.set_write_timeout(Some(handles.socket_timeout))
			.map_err(|e| StoreError::from_redis("CONNECT", e))?;
		Ok(conn)
	}

	/// Whether the store currently answers PING
	pub async fn health_check(&self) -> bool {
		match self.store.ping().await {
			Ok(()) => true,
			Err(e) => {
				tracing::warn!(backend = self.store.backend_name(), error = %e, "Store health check failed");
				false
			}
		}
	}

	/// Blocking variant of [`health_check`](Self::health_check)
	pub fn health_check_blocking(&self) -> bool {
		let result = self.sync_connection().and_then(|mut conn| {
			redis::cmd("PING")
				.query::<String>(&mut conn)
				.map_err(|e| StoreError::from_redis("PING", e))
		});
		match result {
			Ok(pong) => pong == "PONG",
			Err(e) => {
				tracing::warn!(backend = self.store.backend_name(), error = %e, "Blocking store health check failed");
				false
			}
		}
	}
}
