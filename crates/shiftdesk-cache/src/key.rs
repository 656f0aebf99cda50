//! Cache key derivation

use sha2::{Digest, Sha256};
use std::fmt;

/// Natural keys longer than this are replaced by their hash
pub const MAX_KEY_LENGTH: usize = 200;

/// A cache key built from a category and argument parts
///
/// # Examples
///
/// ```
/// use shiftdesk_cache::CacheKey;
///
/// let key = CacheKey::new("user_shifts").arg(42).arg("2024-06");
/// assert_eq!(key.derive(), "user_shifts:42:2024-06");
///
/// let long = CacheKey::new("report").arg("x".repeat(300));
/// assert!(long.derive().starts_with("report:hash:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
	category: String,
	parts: Vec<String>,
}

impl CacheKey {
	pub fn new(category: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			parts: Vec::new(),
		}
	}

	/// Append an argument part
	pub fn arg(mut self, part: impl fmt::Display) -> Self {
		self.parts.push(part.to_string());
		self
	}

	pub fn category(&self) -> &str {
		&self.category
	}

	pub fn parts(&self) -> &[String] {
		&self.parts
	}

	/// `<category>:<part>:<part>...` before any hashing
	pub fn natural(&self) -> String {
		let mut key = self.category.clone();
		for part in &self.parts {
			key.push(':');
			key.push_str(part);
		}
		key
	}

	/// The stored key: the natural key, or `<category>:hash:<sha256 hex>`
	/// when the natural key exceeds [`MAX_KEY_LENGTH`]
	pub fn derive(&self) -> String {
		let natural = self.natural();
		if natural.len() <= MAX_KEY_LENGTH {
			return natural;
		}
		let digest = Sha256::digest(natural.as_bytes());
		format!("{}:hash:{}", self.category, hex::encode(digest))
	}
}

impl fmt::Display for CacheKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.derive())
	}
}
