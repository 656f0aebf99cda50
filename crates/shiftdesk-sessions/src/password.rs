//! Password hashing and strength rules

use std::sync::Arc;

use crate::error::SessionError;

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password hasher trait
///
/// # Examples
///
/// ```
/// use shiftdesk_sessions::{Argon2Hasher, PasswordHasher};
///
/// let hasher = Argon2Hasher::new();
/// let hash = hasher.hash("correct horse 1").unwrap();
///
/// assert!(hasher.verify("correct horse 1", &hash).unwrap());
/// assert!(!hasher.verify("wrong_password", &hash).unwrap());
/// ```
pub trait PasswordHasher: Send + Sync {
	/// Hashes a password
	fn hash(&self, password: &str) -> Result<String, SessionError>;

	/// Verifies a password against a hash
	///
	/// `Ok(false)` on mismatch; `Err` only when the hash cannot be parsed.
	fn verify(&self, password: &str, hash: &str) -> Result<bool, SessionError>;
}

/// Argon2id password hasher with a random 16-byte salt
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
	pub fn new() -> Self {
		Self
	}
}

impl PasswordHasher for Argon2Hasher {
	fn hash(&self, password: &str) -> Result<String, SessionError> {
		use argon2::{
			Argon2,
			password_hash::{PasswordHasher as _, SaltString},
		};
		use rand::RngCore;

		let mut salt_bytes = [0u8; 16];
		rand::rng().fill_bytes(&mut salt_bytes);
		let salt = SaltString::encode_b64(&salt_bytes)
			.map_err(|e| SessionError::Password(e.to_string()))?;

		Argon2::default()
			.hash_password(password.as_bytes(), &salt)
			.map(|hash| hash.to_string())
			.map_err(|e| SessionError::Password(e.to_string()))
	}

	fn verify(&self, password: &str, hash: &str) -> Result<bool, SessionError> {
		use argon2::{
			Argon2,
			password_hash::{PasswordHash, PasswordVerifier},
		};

		let parsed_hash =
			PasswordHash::new(hash).map_err(|e| SessionError::Password(e.to_string()))?;

		Ok(Argon2::default()
			.verify_password(password.as_bytes(), &parsed_hash)
			.is_ok())
	}
}

/// A password rule that a candidate password breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StrengthViolation {
	#[error("Password must be at least {min} characters long")]
	TooShort { min: usize },
	#[error("Password must contain a letter")]
	MissingLetter,
	#[error("Password must contain a digit")]
	MissingDigit,
}

/// Hashing, verification and strength checks behind one handle
#[derive(Clone)]
pub struct PasswordSecurity {
	hasher: Arc<dyn PasswordHasher>,
}

impl Default for PasswordSecurity {
	fn default() -> Self {
		Self::new(Arc::new(Argon2Hasher::new()))
	}
}

impl PasswordSecurity {
	pub fn new(hasher: Arc<dyn PasswordHasher>) -> Self {
		Self { hasher }
	}

	pub fn hash_password(&self, password: &str) -> Result<String, SessionError> {
		self.hasher.hash(password)
	}

	pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, SessionError> {
		self.hasher.verify(password, hash)
	}

	/// List the rules `password` violates; empty when acceptable
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_sessions::{PasswordSecurity, StrengthViolation};
	///
	/// let security = PasswordSecurity::default();
	/// assert!(security.validate_strength("shift2024").is_empty());
	/// assert_eq!(
	///     security.validate_strength("password"),
	///     vec![StrengthViolation::MissingDigit]
	/// );
	/// ```
	pub fn validate_strength(&self, password: &str) -> Vec<StrengthViolation> {
		let mut violations = Vec::new();
		if password.chars().count() < MIN_PASSWORD_LENGTH {
			violations.push(StrengthViolation::TooShort {
				min: MIN_PASSWORD_LENGTH,
			});
		}
		if !password.chars().any(char::is_alphabetic) {
			violations.push(StrengthViolation::MissingLetter);
		}
		if !password.chars().any(|c| c.is_ascii_digit()) {
			violations.push(StrengthViolation::MissingDigit);
		}
		violations
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("abc1", vec![StrengthViolation::TooShort { min: MIN_PASSWORD_LENGTH }])]
	#[case("12345678", vec![StrengthViolation::MissingLetter])]
	#[case("", vec![
		StrengthViolation::TooShort { min: MIN_PASSWORD_LENGTH },
		StrengthViolation::MissingLetter,
		StrengthViolation::MissingDigit,
	])]
	#[case("rota-week-7", vec![])]
	fn test_validate_strength(#[case] password: &str, #[case] expected: Vec<StrengthViolation>) {
		assert_eq!(PasswordSecurity::default().validate_strength(password), expected);
	}

	#[rstest]
	fn test_hashes_are_salted() {
		let security = PasswordSecurity::default();
		let first = security.hash_password("same-pass-1").unwrap();
		let second = security.hash_password("same-pass-1").unwrap();
		assert_ne!(first, second);
		assert!(first.starts_with("$argon2id$"));
		assert!(security.verify_password("same-pass-1", &second).unwrap());
	}

	#[rstest]
	fn test_malformed_hash_is_an_error() {
		let result = PasswordSecurity::default().verify_password("pw", "not-a-hash");
		assert!(matches!(result, Err(SessionError::Password(_))));
	}
}
