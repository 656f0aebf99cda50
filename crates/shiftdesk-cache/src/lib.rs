//! Cache layer for shiftdesk
//!
//! Values are stored as JSON in the shared key-value store under keys derived
//! from a category and the arguments that produced them. TTLs are resolved per
//! category, store failures degrade to misses, and every read is counted.
//!
//! ```
//! use shiftdesk_cache::{CacheKey, SmartCache};
//! use shiftdesk_conf::CacheSettings;
//! use shiftdesk_store::{InMemoryStore, RetryPolicy, StoreClient};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let client = StoreClient::from_store(Arc::new(InMemoryStore::new()), RetryPolicy::default());
//! let cache = SmartCache::new(client, CacheSettings::default());
//!
//! cache.set(&CacheKey::new("shifts").arg(7), &"open", None).await;
//! assert_eq!(cache.invalidate_shift_cache(None, None).await, 1);
//! # }
//! ```

pub mod key;
pub mod memoize;
pub mod metrics;
pub mod smart;

pub use key::{CacheKey, MAX_KEY_LENGTH};
pub use memoize::{MISSING_ARG, Memoized};
pub use metrics::{CacheMetrics, CacheStatistics};
pub use smart::{CacheLookup, SmartCache};
