//! Store errors

use std::time::Duration;

/// Errors raised by key-value store operations
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
	/// The store could not be reached or did not answer PING
	#[error("Store unavailable: {0}")]
	Unavailable(String),
	#[error("Store operation {operation} timed out after {timeout:?}")]
	Timeout {
		operation: &'static str,
		timeout: Duration,
	},
	#[error("Store command {operation} failed: {message}")]
	Command {
		operation: &'static str,
		message: String,
	},
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Connection pool error: {0}")]
	Pool(String),
}

impl StoreError {
	/// Whether retrying the same operation may succeed
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_store::StoreError;
	///
	/// assert!(StoreError::Unavailable("refused".to_string()).is_transient());
	/// assert!(!StoreError::Serialization("bad json".to_string()).is_transient());
	/// ```
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			StoreError::Unavailable(_) | StoreError::Timeout { .. } | StoreError::Pool(_)
		)
	}

	pub(crate) fn from_redis(operation: &'static str, error: redis::RedisError) -> Self {
		if error.is_timeout() {
			// The client-side deadline is reported separately; this is a socket timeout
			StoreError::Unavailable(format!("{} timed out: {}", operation, error))
		} else if error.is_io_error()
			|| error.is_connection_dropped()
			|| error.is_connection_refusal()
		{
			StoreError::Unavailable(format!("{}: {}", operation, error))
		} else {
			StoreError::Command {
				operation,
				message: error.to_string(),
			}
		}
	}
}

pub type StoreResult<T> = Result<T, StoreError>;
