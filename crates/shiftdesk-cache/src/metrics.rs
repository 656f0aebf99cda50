//! Cache hit, miss and error counters per category

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatistics {
	/// Number of cache hits
	pub hits: u64,
	/// Number of cache misses, including reads that failed
	pub misses: u64,
	/// Number of store errors
	pub errors: u64,
	/// Total number of reads
	pub total_requests: u64,
}

impl CacheStatistics {
	/// Calculate hit rate (0.0 to 1.0)
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_cache::CacheStatistics;
	///
	/// let mut stats = CacheStatistics::default();
	/// stats.hits = 75;
	/// stats.misses = 25;
	/// stats.total_requests = 100;
	///
	/// assert_eq!(stats.hit_rate(), 0.75);
	/// ```
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.hits as f64 / self.total_requests as f64
		}
	}

	/// Calculate miss rate (0.0 to 1.0)
	pub fn miss_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.misses as f64 / self.total_requests as f64
		}
	}

	fn merge(&mut self, other: &CacheStatistics) {
		self.hits += other.hits;
		self.misses += other.misses;
		self.errors += other.errors;
		self.total_requests += other.total_requests;
	}
}

#[derive(Debug, Default)]
struct Counters {
	hits: AtomicU64,
	misses: AtomicU64,
	errors: AtomicU64,
}

impl Counters {
	fn statistics(&self) -> CacheStatistics {
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);
		CacheStatistics {
			hits,
			misses,
			errors: self.errors.load(Ordering::Relaxed),
			total_requests: hits + misses,
		}
	}
}

/// Per-category cache counters
///
/// # Examples
///
/// ```
/// use shiftdesk_cache::CacheMetrics;
///
/// let metrics = CacheMetrics::new();
/// metrics.record_hit("shifts");
/// metrics.record_miss("shifts");
/// metrics.record_hit("jobs");
///
/// assert_eq!(metrics.category("shifts").hit_rate(), 0.5);
/// assert_eq!(metrics.totals().hits, 2);
/// ```
#[derive(Debug, Default)]
pub struct CacheMetrics {
	categories: RwLock<HashMap<String, Arc<Counters>>>,
}

impl CacheMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	fn counters(&self, category: &str) -> Arc<Counters> {
		if let Some(counters) = self.categories.read().get(category) {
			return counters.clone();
		}
		self.categories
			.write()
			.entry(category.to_string())
			.or_default()
			.clone()
	}

	pub fn record_hit(&self, category: &str) {
		self.counters(category).hits.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_miss(&self, category: &str) {
		self.counters(category)
			.misses
			.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_error(&self, category: &str) {
		self.counters(category)
			.errors
			.fetch_add(1, Ordering::Relaxed);
	}

	/// Statistics for one category; zeroed when never recorded
	pub fn category(&self, category: &str) -> CacheStatistics {
		self.categories
			.read()
			.get(category)
			.map(|counters| counters.statistics())
			.unwrap_or_default()
	}

	/// Statistics for every recorded category
	pub fn snapshot(&self) -> HashMap<String, CacheStatistics> {
		self.categories
			.read()
			.iter()
			.map(|(category, counters)| (category.clone(), counters.statistics()))
			.collect()
	}

	/// Statistics summed over all categories
	pub fn totals(&self) -> CacheStatistics {
		let mut totals = CacheStatistics::default();
		for counters in self.categories.read().values() {
			totals.merge(&counters.statistics());
		}
		totals
	}

	pub fn reset(&self) {
		self.categories.write().clear();
	}
}
