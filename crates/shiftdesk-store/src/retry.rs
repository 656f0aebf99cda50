//! Retry with exponential backoff for store writes
//!
//! ```
//! use shiftdesk_store::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for(0), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(1), Duration::from_millis(200));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(400));
//! ```

use shiftdesk_conf::RetrySettings;
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// Exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
	/// Total attempts, including the first one
	pub max_attempts: u32,
	/// Delay before the first retry
	pub base_delay: Duration,
	/// Growth factor applied per attempt
	pub multiplier: f64,
	/// Upper bound for any single delay
	pub max_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_settings(&RetrySettings::default())
	}
}

/// All attempts of an operation failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError {
	pub operation: &'static str,
	pub attempts: u32,
	#[source]
	pub source: StoreError,
}

impl RetryPolicy {
	pub fn from_settings(settings: &RetrySettings) -> Self {
		Self {
			max_attempts: settings.max_attempts.max(1),
			base_delay: Duration::from_millis(settings.base_delay_ms),
			multiplier: settings.multiplier,
			max_delay: Duration::from_millis(settings.max_delay_ms),
		}
	}

	/// A policy that makes exactly one attempt
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			base_delay: Duration::ZERO,
			multiplier: 1.0,
			max_delay: Duration::ZERO,
		}
	}

	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);
		self
	}

	pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
		self.base_delay = base_delay;
		self
	}

	/// Delay to wait after the given zero-based failed attempt
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
		let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
		Duration::try_from_secs_f64(secs)
			.unwrap_or(self.max_delay)
			.min(self.max_delay)
	}

	/// Run `f` until it succeeds, fails permanently, or attempts run out
	///
	/// Only transient errors ([`StoreError::is_transient`]) are retried. No
	/// delay follows the final attempt.
	pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T, RetryError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, StoreError>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 0;
		loop {
			match f().await {
				Ok(value) => return Ok(value),
				Err(error) => {
					attempt += 1;
					let exhausted = attempt >= max_attempts || !error.is_transient();
					tracing::warn!(
						operation,
						attempt,
						max_attempts,
						error = %error,
						"Store operation failed"
					);
					if exhausted {
						return Err(RetryError {
							operation,
							attempts: attempt,
							source: error,
						});
					}
					tokio::time::sleep(self.delay_for(attempt - 1)).await;
				}
			}
		}
	}
}
