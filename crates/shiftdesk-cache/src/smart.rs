//! Category-aware cache-aside layer
//!
//! The cache never fails its callers: store errors are logged, counted in
//! [`CacheMetrics`] and treated as a miss (reads) or a no-op (writes).
//! [`SmartCache::lookup`] keeps the hit/miss/error distinction for callers
//! that need it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use shiftdesk_conf::CacheSettings;
use shiftdesk_store::{StoreClient, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::key::CacheKey;
use crate::metrics::CacheMetrics;

/// Result of a cache read
#[derive(Debug)]
pub enum CacheLookup<T> {
	Hit(T),
	Miss,
	StoreError(StoreError),
}

impl<T> CacheLookup<T> {
	pub fn is_hit(&self) -> bool {
		matches!(self, CacheLookup::Hit(_))
	}

	/// Fold into an option, treating errors as misses
	pub fn into_option(self) -> Option<T> {
		match self {
			CacheLookup::Hit(value) => Some(value),
			CacheLookup::Miss | CacheLookup::StoreError(_) => None,
		}
	}
}

/// Cache over the shared store with per-category TTLs
///
/// # Examples
///
/// ```
/// use shiftdesk_cache::{CacheKey, SmartCache};
/// use shiftdesk_conf::CacheSettings;
/// use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
/// let cache = SmartCache::new(client, CacheSettings::default());
///
/// let key = CacheKey::new("user_profile").arg(42);
/// assert!(cache.set(&key, &vec!["alice", "manager"], None).await);
///
/// let cached: Option<Vec<String>> = cache.get(&key).await;
/// assert_eq!(cached, Some(vec!["alice".to_string(), "manager".to_string()]));
/// # }
/// ```
#[derive(Clone)]
pub struct SmartCache {
	client: StoreClient,
	settings: Arc<CacheSettings>,
	metrics: Arc<CacheMetrics>,
}

impl SmartCache {
	pub fn new(client: StoreClient, settings: CacheSettings) -> Self {
		Self {
			client,
			settings: Arc::new(settings),
			metrics: Arc::new(CacheMetrics::new()),
		}
	}

	pub fn metrics(&self) -> &CacheMetrics {
		&self.metrics
	}

	pub fn settings(&self) -> &CacheSettings {
		&self.settings
	}

	fn full_key(&self, key: &CacheKey) -> String {
		format!("{}{}", self.settings.key_prefix, key.derive())
	}

	/// TTL for a write: explicit > category table > global default
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_cache::SmartCache;
	/// use shiftdesk_conf::CacheSettings;
	/// use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
	/// use std::sync::Arc;
	/// use std::time::Duration;
	///
	/// let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
	/// let cache = SmartCache::new(client, CacheSettings::default());
	///
	/// assert_eq!(cache.resolve_ttl("shifts", Some(Duration::from_secs(5))), Duration::from_secs(5));
	/// assert_eq!(cache.resolve_ttl("shifts", None), Duration::from_secs(60));
	/// assert_eq!(cache.resolve_ttl("unlisted", None), Duration::from_secs(300));
	/// ```
	pub fn resolve_ttl(&self, category: &str, explicit: Option<Duration>) -> Duration {
		explicit.unwrap_or_else(|| {
			let secs = self
				.settings
				.category_ttls
				.get(category)
				.copied()
				.unwrap_or(self.settings.default_ttl_secs);
			Duration::from_secs(secs)
		})
	}

	/// Read a value, keeping store errors distinct from misses
	pub async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheLookup<T> {
		let category = key.category();
		let full_key = self.full_key(key);

		let raw = match self.client.store().get(&full_key).await {
			Ok(Some(raw)) => raw,
			Ok(None) => {
				self.metrics.record_miss(category);
				tracing::debug!(category, key = %full_key, "Cache miss");
				return CacheLookup::Miss;
			}
			Err(e) => {
				self.metrics.record_error(category);
				self.metrics.record_miss(category);
				return CacheLookup::StoreError(e);
			}
		};

		match serde_json::from_str(&raw) {
			Ok(value) => {
				self.metrics.record_hit(category);
				tracing::debug!(category, key = %full_key, "Cache hit");
				CacheLookup::Hit(value)
			}
			Err(e) => {
				self.metrics.record_error(category);
				self.metrics.record_miss(category);
				CacheLookup::StoreError(StoreError::Serialization(e.to_string()))
			}
		}
	}

	/// Read a value; errors are logged and reported as a miss
	pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
		match self.lookup(key).await {
			CacheLookup::StoreError(e) => {
				tracing::warn!(
					category = key.category(),
					key = %key,
					error = %e,
					"Cache read failed"
				);
				None
			}
			other => other.into_option(),
		}
	}

	/// Store a value; false when the write failed
	pub async fn set<T: Serialize + ?Sized>(
		&self,
		key: &CacheKey,
		value: &T,
		ttl: Option<Duration>,
	) -> bool {
		let category = key.category();
		let payload = match serde_json::to_string(value) {
			Ok(payload) => payload,
			Err(e) => {
				self.metrics.record_error(category);
				tracing::warn!(category, key = %key, error = %e, "Cache value not serializable");
				return false;
			}
		};

		let full_key = self.full_key(key);
		let ttl = self.resolve_ttl(category, ttl);
		let store = self.client.store();
		match self
			.client
			.retry_policy()
			.run("SET", || store.set(&full_key, &payload, Some(ttl)))
			.await
		{
			Ok(()) => {
				tracing::debug!(category, key = %full_key, ttl_secs = ttl.as_secs(), "Cache set");
				true
			}
			Err(e) => {
				self.metrics.record_error(category);
				tracing::warn!(category, key = %full_key, error = %e, "Cache write failed");
				false
			}
		}
	}

	/// Remove a value; true when it existed
	pub async fn delete(&self, key: &CacheKey) -> bool {
		let full_key = self.full_key(key);
		match self.client.store().delete_one(&full_key).await {
			Ok(existed) => existed,
			Err(e) => {
				self.metrics.record_error(key.category());
				tracing::warn!(category = key.category(), key = %full_key, error = %e, "Cache delete failed");
				false
			}
		}
	}

	/// Delete every key matching a glob pattern, returning how many were removed
	///
	/// The configured key prefix is prepended to `pattern`.
	pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
		let full_pattern = format!("{}{}", self.settings.key_prefix, pattern);
		let store = self.client.store();

		let keys = match store.scan_match(&full_pattern).await {
			Ok(keys) => keys,
			Err(e) => {
				tracing::warn!(pattern = %full_pattern, error = %e, "Cache scan failed");
				return 0;
			}
		};
		if keys.is_empty() {
			return 0;
		}

		match self
			.client
			.retry_policy()
			.run("DEL", || store.delete(&keys))
			.await
		{
			Ok(removed) => {
				let removed = usize::try_from(removed).unwrap_or(usize::MAX);
				tracing::debug!(pattern = %full_pattern, removed, "Cache invalidated");
				removed
			}
			Err(e) => {
				tracing::warn!(pattern = %full_pattern, error = %e, "Cache invalidation failed");
				0
			}
		}
	}

	/// Drop everything cached about a user
	///
	/// Over-broad on purpose: `user:4*` also matches user 42.
	pub async fn invalidate_user_cache(&self, user_id: i64) -> usize {
		let patterns = [
			format!("user:{}*", user_id),
			format!("user_profile:{}*", user_id),
			format!("user_shifts:{}*", user_id),
			format!("dashboard:{}*", user_id),
			format!("*:user:{}*", user_id),
		];
		self.invalidate_all(&patterns).await
	}

	/// Drop cached shift, schedule and dashboard data
	///
	/// Always clears every `shifts:`, `schedule:` and `dashboard:` entry, plus
	/// the given job and shift.
	pub async fn invalidate_shift_cache(&self, job_id: Option<i64>, shift_id: Option<i64>) -> usize {
		let mut patterns = vec![
			"shifts:*".to_string(),
			"schedule:*".to_string(),
			"dashboard:*".to_string(),
		];
		if let Some(job_id) = job_id {
			patterns.push(format!("job:{}*", job_id));
		}
		if let Some(shift_id) = shift_id {
			patterns.push(format!("shift:{}*", shift_id));
		}
		self.invalidate_all(&patterns).await
	}

	async fn invalidate_all(&self, patterns: &[String]) -> usize {
		let mut removed = 0;
		for pattern in patterns {
			removed += self.invalidate_pattern(pattern).await;
		}
		removed
	}

	/// Cache-aside: return the cached value or compute, cache and return it
	///
	/// `Err` results are returned as-is and never cached.
	pub async fn get_or_compute<T, E, F, Fut>(
		&self,
		key: &CacheKey,
		ttl: Option<Duration>,
		compute: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some(cached) = self.get(key).await {
			return Ok(cached);
		}
		let value = compute().await?;
		self.set(key, &value, ttl).await;
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use shiftdesk_store::{InMemoryStore, KeyValueStore, RetryPolicy};

	fn cache_with_prefix(prefix: &str) -> (InMemoryStore, SmartCache) {
		let store = InMemoryStore::new();
		let client = StoreClient::from_store(Arc::new(store.clone()), RetryPolicy::no_retry());
		let mut settings = CacheSettings::default();
		settings.key_prefix = prefix.to_string();
		(store, SmartCache::new(client, settings))
	}

	#[rstest]
	#[tokio::test]
	async fn test_key_prefix_applies_to_storage_and_patterns() {
		let (store, cache) = cache_with_prefix("app:");
		let key = CacheKey::new("jobs").arg(1);
		assert!(cache.set(&key, &1, None).await);
		assert!(store.exists("app:jobs:1").await.unwrap());

		assert_eq!(cache.invalidate_pattern("jobs:*").await, 1);
		assert!(store.is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_category_ttl_applied_on_write() {
		let (store, cache) = cache_with_prefix("");
		cache.set(&CacheKey::new("dashboard").arg(1), &"x", None).await;
		let ttl = store.ttl("dashboard:1").unwrap();
		assert!(ttl <= Duration::from_secs(30));
		assert!(ttl > Duration::from_secs(25));
	}

	#[rstest]
	#[tokio::test]
	async fn test_undecodable_value_is_a_store_error() {
		let (store, cache) = cache_with_prefix("");
		store.set("user:1", "{broken", None).await.unwrap();

		let lookup: CacheLookup<u32> = cache.lookup(&CacheKey::new("user").arg(1)).await;
		assert!(matches!(lookup, CacheLookup::StoreError(StoreError::Serialization(_))));
		assert_eq!(cache.metrics().category("user").errors, 1);
	}
}
