//! Session identifiers and CSRF tokens
//!
//! A CSRF token is bound to its session at creation:
//! `hex(sha256("<session_id>:<secret>:<timestamp_nanos>"))`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Random bytes per session id
const SESSION_ID_BYTES: usize = 32;

/// Generate an unguessable, URL-safe session id
///
/// # Examples
///
/// ```
/// use shiftdesk_sessions::csrf::generate_session_id;
///
/// let id = generate_session_id();
/// assert_eq!(id.len(), 43);
/// assert_ne!(id, generate_session_id());
/// ```
pub fn generate_session_id() -> String {
	let mut bytes = [0u8; SESSION_ID_BYTES];
	rand::rng().fill_bytes(&mut bytes);
	URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the CSRF token for a session
pub fn derive_csrf_token(session_id: &str, secret: &str, timestamp_nanos: i64) -> String {
	let mut hasher = Sha256::new();
	hasher.update(session_id.as_bytes());
	hasher.update(b":");
	hasher.update(secret.as_bytes());
	hasher.update(b":");
	hasher.update(timestamp_nanos.to_string().as_bytes());
	hex::encode(hasher.finalize())
}

/// Constant-time token comparison
///
/// # Examples
///
/// ```
/// use shiftdesk_sessions::csrf::tokens_match;
///
/// assert!(tokens_match("abc", "abc"));
/// assert!(!tokens_match("abc", "abd"));
/// assert!(!tokens_match("abc", "abcd"));
/// ```
pub fn tokens_match(expected: &str, provided: &str) -> bool {
	expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rstest::rstest;

	#[rstest]
	fn test_token_is_sha256_hex() {
		let token = derive_csrf_token("sid", "secret", 1);
		assert_eq!(token.len(), 64);
		assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[rstest]
	fn test_token_depends_on_every_input() {
		let base = derive_csrf_token("sid", "secret", 1);
		assert_ne!(base, derive_csrf_token("sid2", "secret", 1));
		assert_ne!(base, derive_csrf_token("sid", "secret2", 1));
		assert_ne!(base, derive_csrf_token("sid", "secret", 2));
		assert_eq!(base, derive_csrf_token("sid", "secret", 1));
	}

	#[rstest]
	fn test_session_id_is_url_safe() {
		let id = generate_session_id();
		assert!(
			id.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
		);
	}

	proptest! {
		#[test]
		fn prop_tokens_match_is_equality(a in "[a-f0-9]{0,64}", b in "[a-f0-9]{0,64}") {
			prop_assert_eq!(tokens_match(&a, &b), a == b);
		}
	}
}
