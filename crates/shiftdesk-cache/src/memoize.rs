//! Memoization of async functions over [`SmartCache`]

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::key::CacheKey;
use crate::smart::SmartCache;

/// Key part standing in for a declared argument the caller did not pass
pub const MISSING_ARG: &str = "<missing>";

/// Cache the results of one named function
///
/// The function name is the cache category. The key is built from the
/// argument values in call order, or from a declared subset of argument
/// names in declaration order.
///
/// # Examples
///
/// ```
/// use shiftdesk_cache::{Memoized, SmartCache};
/// use shiftdesk_conf::CacheSettings;
/// use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
/// let cache = SmartCache::new(client, CacheSettings::default());
///
/// let user_shifts = Memoized::new(&cache, "user_shifts").with_key_args(&["user_id"]);
/// let user_id = 42;
/// let include_drafts = false;
///
/// let shifts: Vec<u32> = user_shifts
///     .call(&[("user_id", &user_id), ("include_drafts", &include_drafts)], || async {
///         Ok::<_, std::io::Error>(vec![1, 2, 3])
///     })
///     .await?;
/// assert_eq!(shifts, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Memoized {
	cache: SmartCache,
	category: String,
	key_args: Option<Vec<String>>,
	ttl: Option<Duration>,
}

impl Memoized {
	pub fn new(cache: &SmartCache, function_name: impl Into<String>) -> Self {
		Self {
			cache: cache.clone(),
			category: function_name.into(),
			key_args: None,
			ttl: None,
		}
	}

	/// Build keys from these arguments only
	pub fn with_key_args(mut self, names: &[&str]) -> Self {
		self.key_args = Some(names.iter().map(|name| name.to_string()).collect());
		self
	}

	/// Override the category TTL
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);
		self
	}

	pub fn category(&self) -> &str {
		&self.category
	}

	/// The cache key for a set of named arguments
	pub fn key(&self, args: &[(&str, &dyn Display)]) -> CacheKey {
		let key = CacheKey::new(self.category.clone());
		match &self.key_args {
			None => args.iter().fold(key, |key, (_, value)| key.arg(value)),
			Some(names) => names.iter().fold(key, |key, name| {
				match args.iter().find(|(arg_name, _)| arg_name == name) {
					Some((_, value)) => key.arg(value),
					None => {
						tracing::warn!(
							category = %self.category,
							argument = %name,
							"Declared key argument missing from call"
						);
						key.arg(MISSING_ARG)
					}
				}
			}),
		}
	}

	/// Return the cached result for `args`, or run `compute` and cache it
	pub async fn call<T, E, F, Fut>(&self, args: &[(&str, &dyn Display)], compute: F) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let key = self.key(args);
		self.cache.get_or_compute(&key, self.ttl, compute).await
	}

	/// Drop every cached result of this function
	///
	/// Other categories sharing the name as a prefix are left alone.
	pub async fn invalidate_all(&self) -> usize {
		let mut removed = self
			.cache
			.invalidate_pattern(&format!("{}:*", self.category))
			.await;
		// Results of a call without key arguments live at the bare category
		if self.cache.delete(&CacheKey::new(self.category.clone())).await {
			removed += 1;
		}
		removed
	}
}
