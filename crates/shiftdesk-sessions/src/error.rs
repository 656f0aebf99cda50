//! Session errors

use shiftdesk_store::{RetryError, StoreError};

/// Errors raised by session operations
///
/// A missing, expired or mismatched session is not an error; those cases
/// surface as `None` from [`SessionManager::validate_session`](crate::SessionManager::validate_session).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	/// The session record could not be written within the retry budget
	#[error("Session creation failed after {attempts} attempt(s): {source}")]
	CreationFailed {
		attempts: u32,
		#[source]
		source: StoreError,
	},
	#[error("Invalid credentials")]
	InvalidCredentials,
	#[error("Password error: {0}")]
	Password(String),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error("Serialization error: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for SessionError {
	fn from(error: serde_json::Error) -> Self {
		SessionError::Serialization(error.to_string())
	}
}

impl From<RetryError> for SessionError {
	fn from(error: RetryError) -> Self {
		SessionError::Store(error.source)
	}
}
