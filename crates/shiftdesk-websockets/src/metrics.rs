//! Connection registry counters
//!
//! ```
//! use shiftdesk_websockets::WebSocketMetrics;
//!
//! let metrics = WebSocketMetrics::new();
//! metrics.record_connection();
//! metrics.record_message_sent();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.active_connections, 1);
//! assert_eq!(snapshot.messages_sent, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
	/// Sockets currently registered in this process
	pub active_connections: u64,
	/// Registrations since startup
	pub total_connections: u64,
	pub disconnections: u64,
	pub messages_sent: u64,
	/// Sends that failed and unregistered their socket
	pub delivery_failures: u64,
	/// Connections removed by the staleness reaper
	pub stale_reaped: u64,
}

impl MetricsSnapshot {
	/// Returns a summary of the metrics as a string.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk_websockets::MetricsSnapshot;
	///
	/// let snapshot = MetricsSnapshot {
	///     active_connections: 10,
	///     total_connections: 100,
	///     ..Default::default()
	/// };
	///
	/// assert!(snapshot.summary().contains("Active: 10"));
	/// ```
	pub fn summary(&self) -> String {
		format!(
			"Connections [Active: {}, Total: {}, Disconnections: {}, Stale: {}] | Messages [Sent: {}, Failed: {}]",
			self.active_connections,
			self.total_connections,
			self.disconnections,
			self.stale_reaped,
			self.messages_sent,
			self.delivery_failures,
		)
	}
}

#[derive(Debug, Default)]
pub struct WebSocketMetrics {
	active_connections: AtomicU64,
	total_connections: AtomicU64,
	disconnections: AtomicU64,
	messages_sent: AtomicU64,
	delivery_failures: AtomicU64,
	stale_reaped: AtomicU64,
}

impl WebSocketMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_connection(&self) {
		let _ = self
			.active_connections
			.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
				Some(v.saturating_add(1))
			});
		self.total_connections.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_disconnection(&self) {
		// Saturates: a socket can be unregistered by both a failed send and the reaper
		let _ = self
			.active_connections
			.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
				Some(v.saturating_sub(1))
			});
		self.disconnections.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_message_sent(&self) {
		self.messages_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_delivery_failure(&self) {
		self.delivery_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_stale_reaped(&self, count: u64) {
		self.stale_reaped.fetch_add(count, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			active_connections: self.active_connections.load(Ordering::Relaxed),
			total_connections: self.total_connections.load(Ordering::Relaxed),
			disconnections: self.disconnections.load(Ordering::Relaxed),
			messages_sent: self.messages_sent.load(Ordering::Relaxed),
			delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
			stale_reaped: self.stale_reaped.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_disconnection_never_underflows() {
		let metrics = WebSocketMetrics::new();
		metrics.record_connection();
		metrics.record_disconnection();
		metrics.record_disconnection();

		let snapshot = metrics.snapshot();
		assert_eq!(snapshot.active_connections, 0);
		assert_eq!(snapshot.disconnections, 2);
		assert_eq!(snapshot.total_connections, 1);
	}
}
