//! In-memory store implementation
//!
//! A process-local [`KeyValueStore`] with Redis-like semantics: TTL expiry,
//! glob key matching, typed values (string, hash, set) and `WRONGTYPE`
//! errors. Used in tests and single-process development setups.
//!
//! Fault injection (`set_unavailable`, `fail_next_writes`) lets callers
//! exercise the degradation and retry paths without a real server.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;

#[derive(Debug, Clone)]
enum StoredValue {
	Text(String),
	Hash(HashMap<String, String>),
	Set(HashSet<String>),
}

impl StoredValue {
	fn type_name(&self) -> &'static str {
		match self {
			StoredValue::Text(_) => "string",
			StoredValue::Hash(_) => "hash",
			StoredValue::Set(_) => "set",
		}
	}
}

#[derive(Debug, Clone)]
struct Entry {
	value: StoredValue,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl.map(|d| Instant::now() + d),
		}
	}

	fn is_expired(&self) -> bool {
		self.expires_at
			.map(|expires_at| Instant::now() >= expires_at)
			.unwrap_or(false)
	}
}

#[derive(Debug, Default)]
struct Faults {
	unavailable: AtomicBool,
	failing_writes: AtomicU32,
}

/// In-memory store backend
///
/// Clones share the same underlying data.
///
/// # Examples
///
/// ```
/// use shiftdesk_store::{InMemoryStore, KeyValueStore};
///
/// # async fn example() {
/// let store = InMemoryStore::new();
/// store.hset("ws:connection:abc", "user_id", "42").await.unwrap();
///
/// let fields = store.hgetall("ws:connection:abc").await.unwrap();
/// assert_eq!(fields.get("user_id").map(String::as_str), Some("42"));
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
	entries: Arc<Mutex<HashMap<String, Entry>>>,
	faults: Arc<Faults>,
}

impl InMemoryStore {
	/// Create a new, empty in-memory store
	pub fn new() -> Self {
		Self::default()
	}

	/// Simulate an outage: every operation fails with [`StoreError::Unavailable`]
	pub fn set_unavailable(&self, unavailable: bool) {
		self.faults.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Fail the next `count` write operations with [`StoreError::Unavailable`]
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_store::{InMemoryStore, KeyValueStore};
	///
	/// # async fn example() {
	/// let store = InMemoryStore::new();
	/// store.fail_next_writes(1);
	///
	/// assert!(store.set("k", "v", None).await.is_err());
	/// assert!(store.set("k", "v", None).await.is_ok());
	/// # }
	/// ```
	pub fn fail_next_writes(&self, count: u32) {
		self.faults.failing_writes.store(count, Ordering::SeqCst);
	}

	/// Number of live (unexpired) keys
	pub fn len(&self) -> usize {
		let mut entries = self.entries.lock();
		entries.retain(|_, entry| !entry.is_expired());
		entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Remaining time to live of a key, `None` when missing or persistent
	pub fn ttl(&self, key: &str) -> Option<Duration> {
		let mut entries = self.entries.lock();
		let entry = live_entry(&mut entries, key)?;
		entry
			.expires_at
			.map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
	}

	/// Remove expired entries
	pub fn cleanup_expired(&self) {
		self.entries.lock().retain(|_, entry| !entry.is_expired());
	}

	fn check_available(&self, operation: &'static str) -> StoreResult<()> {
		if self.faults.unavailable.load(Ordering::SeqCst) {
			return Err(StoreError::Unavailable(format!(
				"{}: in-memory store marked unavailable",
				operation
			)));
		}
		Ok(())
	}

	fn check_write(&self, operation: &'static str) -> StoreResult<()> {
		self.check_available(operation)?;
		let injected = self
			.faults
			.failing_writes
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
				remaining.checked_sub(1)
			})
			.is_ok();
		if injected {
			return Err(StoreError::Unavailable(format!(
				"{}: injected write failure",
				operation
			)));
		}
		Ok(())
	}
}

/// Look up a key, dropping it first if it has expired
fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
	if entries.get(key).is_some_and(Entry::is_expired) {
		entries.remove(key);
	}
	entries.get_mut(key)
}

fn wrong_type(operation: &'static str, found: &StoredValue) -> StoreError {
	StoreError::Command {
		operation,
		message: format!(
			"WRONGTYPE Operation against a key holding a {} value",
			found.type_name()
		),
	}
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
	async fn get(&self, key: &str) -> StoreResult<Option<String>> {
		self.check_available("GET")?;
		let mut entries = self.entries.lock();
		match live_entry(&mut entries, key) {
			Some(Entry {
				value: StoredValue::Text(text),
				..
			}) => Ok(Some(text.clone())),
			Some(entry) => Err(wrong_type("GET", &entry.value)),
			None => Ok(None),
		}
	}

	async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
		self.check_write("SET")?;
		self.entries.lock().insert(
			key.to_string(),
			Entry::new(StoredValue::Text(value.to_string()), ttl),
		);
		Ok(())
	}

	async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
		self.check_write("DEL")?;
		let mut entries = self.entries.lock();
		let mut removed = 0;
		for key in keys {
			if let Some(entry) = entries.remove(key)
				&& !entry.is_expired()
			{
				removed += 1;
			}
		}
		Ok(removed)
	}

	async fn exists(&self, key: &str) -> StoreResult<bool> {
		self.check_available("EXISTS")?;
		let mut entries = self.entries.lock();
		Ok(live_entry(&mut entries, key).is_some())
	}

	async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
		self.check_available("SCAN")?;
		let matcher = glob::Pattern::new(pattern).map_err(|e| StoreError::Command {
			operation: "SCAN",
			message: format!("invalid pattern {:?}: {}", pattern, e),
		})?;
		let mut entries = self.entries.lock();
		entries.retain(|_, entry| !entry.is_expired());
		Ok(entries
			.keys()
			.filter(|key| matcher.matches(key))
			.cloned()
			.collect())
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
		self.hset_multiple(key, &[(field.to_string(), value.to_string())])
			.await
	}

	async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
		self.check_write("HSET")?;
		let mut entries = self.entries.lock();
		if live_entry(&mut entries, key).is_none() {
			entries.insert(
				key.to_string(),
				Entry::new(StoredValue::Hash(HashMap::new()), None),
			);
		}
		match entries.get_mut(key).map(|entry| &mut entry.value) {
			Some(StoredValue::Hash(hash)) => {
				hash.extend(fields.iter().cloned());
				Ok(())
			}
			Some(other) => Err(wrong_type("HSET", other)),
			None => Ok(()),
		}
	}

	async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
		self.check_available("HGETALL")?;
		let mut entries = self.entries.lock();
		match live_entry(&mut entries, key) {
			Some(Entry {
				value: StoredValue::Hash(hash),
				..
			}) => Ok(hash.clone()),
			Some(entry) => Err(wrong_type("HGETALL", &entry.value)),
			None => Ok(HashMap::new()),
		}
	}

	async fn sadd(&self, key: &str, member: &str) -> StoreResult<()> {
		self.check_write("SADD")?;
		let mut entries = self.entries.lock();
		if live_entry(&mut entries, key).is_none() {
			entries.insert(
				key.to_string(),
				Entry::new(StoredValue::Set(HashSet::new()), None),
			);
		}
		match entries.get_mut(key).map(|entry| &mut entry.value) {
			Some(StoredValue::Set(set)) => {
				set.insert(member.to_string());
				Ok(())
			}
			Some(other) => Err(wrong_type("SADD", other)),
			None => Ok(()),
		}
	}

	async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
		self.check_write("SREM")?;
		let mut entries = self.entries.lock();
		let now_empty = match live_entry(&mut entries, key) {
			Some(Entry {
				value: StoredValue::Set(set),
				..
			}) => {
				set.remove(member);
				set.is_empty()
			}
			Some(entry) => return Err(wrong_type("SREM", &entry.value)),
			None => false,
		};
		// Redis drops a set once its last member is removed
		if now_empty {
			entries.remove(key);
		}
		Ok(())
	}

	async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
		self.check_available("SMEMBERS")?;
		let mut entries = self.entries.lock();
		match live_entry(&mut entries, key) {
			Some(Entry {
				value: StoredValue::Set(set),
				..
			}) => Ok(set.iter().cloned().collect()),
			Some(entry) => Err(wrong_type("SMEMBERS", &entry.value)),
			None => Ok(Vec::new()),
		}
	}

	async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
		self.check_write("EXPIRE")?;
		let mut entries = self.entries.lock();
		match live_entry(&mut entries, key) {
			Some(entry) => {
				entry.expires_at = Some(Instant::now() + ttl);
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn ping(&self) -> StoreResult<()> {
		self.check_available("PING")
	}

	fn backend_name(&self) -> &'static str {
		"memory"
	}
}
