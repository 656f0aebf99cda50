//! Realtime connection registry
//!
//! Live sockets stay in the owning process's [`ConnectionDirectory`]. A
//! socket-free [`ConnectionDescriptor`] is mirrored into the store so every
//! process can see who is connected:
//!
//! - `ws:connection:<websocket_id>`: descriptor hash
//! - `ws:user:<user_id>`: set of the user's websocket ids
//!
//! Both keys expire after twice the staleness threshold unless a heartbeat
//! refreshes them. Messages are only delivered to sockets held locally.
//! Registry operations never fail their callers; store problems are logged.

use chrono::Utc;
use shiftdesk_conf::RealtimeSettings;
use shiftdesk_sessions::{SessionManager, UserData};
use shiftdesk_store::{RetryError, StoreClient, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::connection::{Message, WebSocketConnection};
use crate::descriptor::ConnectionDescriptor;
use crate::directory::{ConnectionDirectory, LocalConnection};
use crate::metrics::WebSocketMetrics;

const CONNECTION_KEY_PREFIX: &str = "ws:connection:";
const USER_KEY_PREFIX: &str = "ws:user:";

fn connection_key(websocket_id: &str) -> String {
	format!("{}{}", CONNECTION_KEY_PREFIX, websocket_id)
}

fn user_key(user_id: i64) -> String {
	format!("{}{}", USER_KEY_PREFIX, user_id)
}

/// Tracks realtime connections and fans messages out to them
pub struct ConnectionRegistry {
	client: StoreClient,
	sessions: Arc<SessionManager>,
	directory: ConnectionDirectory,
	metrics: WebSocketMetrics,
	stale_threshold: Duration,
}

impl ConnectionRegistry {
	pub fn new(
		client: StoreClient,
		sessions: Arc<SessionManager>,
		settings: &RealtimeSettings,
	) -> Self {
		Self {
			client,
			sessions,
			directory: ConnectionDirectory::new(),
			metrics: WebSocketMetrics::new(),
			stale_threshold: settings.stale_threshold(),
		}
	}

	pub fn metrics(&self) -> &WebSocketMetrics {
		&self.metrics
	}

	pub fn directory(&self) -> &ConnectionDirectory {
		&self.directory
	}

	pub fn stale_threshold(&self) -> Duration {
		self.stale_threshold
	}

	fn mirror_ttl(&self) -> Duration {
		self.stale_threshold.saturating_mul(2)
	}

	/// Register a socket for an authenticated session
	///
	/// Returns false, leaving no state behind, when the session is invalid or
	/// belongs to a user other than `user`. A failure to mirror the
	/// descriptor into the store is logged; the local registration stands.
	pub async fn register_connection(
		&self,
		socket: Arc<WebSocketConnection>,
		websocket_id: &str,
		session_id: &str,
		user: &UserData,
	) -> bool {
		let Some(session) = self.sessions.validate_bound_session(session_id).await else {
			tracing::warn!(
				websocket_id,
				user_id = user.user_id,
				"Connection rejected: invalid session"
			);
			return false;
		};

		if session.user_id != user.user_id {
			tracing::warn!(
				websocket_id,
				user_id = user.user_id,
				session_user_id = session.user_id,
				"Connection rejected: session belongs to another user"
			);
			return false;
		}

		let descriptor = ConnectionDescriptor::new(websocket_id, &session, Utc::now());
		let replaced = self.directory.insert(LocalConnection {
			socket,
			descriptor: descriptor.clone(),
		});
		if replaced.is_some() {
			self.metrics.record_disconnection();
		}
		self.metrics.record_connection();

		if let Err(e) = self.mirror(&descriptor).await {
			tracing::warn!(
				websocket_id,
				user_id = descriptor.user_id,
				error = %e,
				"Failed to mirror connection to store"
			);
		}

		tracing::info!(
			websocket_id,
			user_id = descriptor.user_id,
			is_manager = descriptor.is_manager,
			"Connection registered"
		);
		true
	}

	async fn mirror(&self, descriptor: &ConnectionDescriptor) -> Result<(), RetryError> {
		let store = self.client.store();
		let retry = self.client.retry_policy();
		let conn_key = connection_key(&descriptor.websocket_id);
		let index_key = user_key(descriptor.user_id);
		let fields = descriptor.to_fields();
		let ttl = self.mirror_ttl();

		retry
			.run("HSET", || store.hset_multiple(&conn_key, &fields))
			.await?;
		retry.run("EXPIRE", || store.expire(&conn_key, ttl)).await?;
		retry
			.run("SADD", || store.sadd(&index_key, &descriptor.websocket_id))
			.await?;
		retry.run("EXPIRE", || store.expire(&index_key, ttl)).await?;
		Ok(())
	}

	/// Forget a connection everywhere; tolerant of partially missing state
	///
	/// Returns whether this process held the socket. The socket itself is
	/// not closed.
	pub async fn unregister_connection(&self, websocket_id: &str) -> bool {
		let local = self.directory.remove(websocket_id);
		if local.is_some() {
			self.metrics.record_disconnection();
		}

		let store = self.client.store();
		let conn_key = connection_key(websocket_id);
		let user_id = match &local {
			Some(local) => Some(local.user_id()),
			None => match store.hgetall(&conn_key).await {
				Ok(fields) => fields.get("user_id").and_then(|id| id.parse().ok()),
				Err(e) => {
					tracing::debug!(websocket_id, error = %e, "Descriptor unreadable during unregister");
					None
				}
			},
		};

		if let Err(e) = store.delete_one(&conn_key).await {
			tracing::warn!(websocket_id, error = %e, "Failed to delete connection descriptor");
		}
		if let Some(user_id) = user_id
			&& let Err(e) = store.srem(&user_key(user_id), websocket_id).await
		{
			tracing::warn!(websocket_id, user_id, error = %e, "Failed to update user connection index");
		}

		tracing::debug!(websocket_id, ?user_id, "Connection unregistered");
		local.is_some()
	}

	/// Deliver to every socket of a user held by this process
	pub async fn send_to_user(&self, user_id: i64, message: &Message) -> usize {
		let candidates = self.user_connection_ids(user_id).await;
		self.deliver(candidates, message, |local| local.user_id() == user_id)
			.await
	}

	/// Deliver to every manager socket held by this process
	pub async fn send_to_managers(&self, message: &Message) -> usize {
		let mut candidates: HashSet<String> =
			self.directory.manager_connection_ids().into_iter().collect();

		match self.scan_descriptors().await {
			Ok(descriptors) => candidates.extend(
				descriptors
					.into_iter()
					.filter(|d| d.is_manager)
					.map(|d| d.websocket_id),
			),
			Err(e) => {
				tracing::warn!(error = %e, "Manager lookup failed, using local connections");
			}
		}

		self.deliver(candidates, message, LocalConnection::is_manager)
			.await
	}

	/// Deliver to every socket held by this process
	pub async fn broadcast_to_all(&self, message: &Message) -> usize {
		let candidates = self.directory.connection_ids();
		self.deliver(candidates, message, |_| true).await
	}

	/// Send to the local sockets among `candidates` that `recipient` accepts
	///
	/// Candidate ids from the store can name a socket of another user here
	/// (a reused id or a stale index entry), so each socket is checked again.
	async fn deliver(
		&self,
		candidates: impl IntoIterator<Item = String>,
		message: &Message,
		recipient: impl Fn(&LocalConnection) -> bool,
	) -> usize {
		let mut delivered = 0;
		for websocket_id in candidates {
			// Held by another process, or already gone
			let Some(local) = self.directory.get(&websocket_id) else {
				continue;
			};
			if !recipient(&local) {
				tracing::debug!(
					websocket_id = %websocket_id,
					user_id = local.user_id(),
					"Skipping socket outside the target audience"
				);
				continue;
			}
			match local.socket.send(message.clone()) {
				Ok(()) => {
					delivered += 1;
					self.metrics.record_message_sent();
				}
				Err(e) => {
					tracing::warn!(
						websocket_id = %websocket_id,
						user_id = local.user_id(),
						error = %e,
						"Delivery failed, unregistering connection"
					);
					self.metrics.record_delivery_failure();
					self.unregister_connection(&websocket_id).await;
				}
			}
		}
		delivered
	}

	/// Refresh a connection's heartbeat and the TTL of its shared keys
	///
	/// Returns false when the connection is unknown both locally and in the
	/// store.
	pub async fn update_heartbeat(&self, websocket_id: &str) -> bool {
		let now = Utc::now();
		if let Some(descriptor) = self.directory.touch(websocket_id, now) {
			if let Err(e) = self.mirror(&descriptor).await {
				tracing::warn!(websocket_id, error = %e, "Failed to mirror heartbeat");
			}
			return true;
		}

		let store = self.client.store();
		let conn_key = connection_key(websocket_id);
		let fields = match store.hgetall(&conn_key).await {
			Ok(fields) if !fields.is_empty() => fields,
			Ok(_) => return false,
			Err(e) => {
				tracing::warn!(websocket_id, error = %e, "Heartbeat lookup failed");
				return false;
			}
		};

		match ConnectionDescriptor::from_fields(&fields) {
			Ok(mut descriptor) => {
				descriptor.last_heartbeat = now;
				if let Err(e) = self.mirror(&descriptor).await {
					tracing::warn!(websocket_id, error = %e, "Failed to mirror heartbeat");
					return false;
				}
				true
			}
			Err(e) => {
				tracing::warn!(websocket_id, error = %e, "Malformed connection descriptor");
				false
			}
		}
	}

	/// Unregister connections whose heartbeat is older than the threshold
	///
	/// Malformed descriptors are removed as well. Returns the number removed.
	pub async fn cleanup_stale_connections(&self) -> usize {
		let now = Utc::now();
		let mut stale: HashSet<String> = self
			.directory
			.descriptors()
			.into_iter()
			.filter(|d| d.is_stale_at(self.stale_threshold, now))
			.map(|d| d.websocket_id)
			.collect();

		let store = self.client.store();
		match store.scan_match(&format!("{}*", CONNECTION_KEY_PREFIX)).await {
			Ok(keys) => {
				for key in keys {
					let Some(websocket_id) = key.strip_prefix(CONNECTION_KEY_PREFIX) else {
						continue;
					};
					let fields = match store.hgetall(&key).await {
						Ok(fields) if fields.is_empty() => continue,
						Ok(fields) => fields,
						Err(e) => {
							tracing::debug!(websocket_id, error = %e, "Descriptor unreadable during cleanup");
							continue;
						}
					};
					match ConnectionDescriptor::from_fields(&fields) {
						Ok(descriptor) if descriptor.is_stale_at(self.stale_threshold, now) => {
							stale.insert(websocket_id.to_string());
						}
						Ok(_) => {}
						Err(e) => {
							tracing::warn!(websocket_id, error = %e, "Removing malformed connection descriptor");
							stale.insert(websocket_id.to_string());
						}
					}
				}
			}
			Err(e) => {
				tracing::warn!(error = %e, "Connection scan failed, cleaning local connections only");
			}
		}

		for websocket_id in &stale {
			self.unregister_connection(websocket_id).await;
		}

		let removed = stale.len();
		if removed > 0 {
			self.metrics.record_stale_reaped(removed as u64);
			tracing::info!(removed, "Stale connections cleaned up");
		}
		removed
	}

	/// Run [`cleanup_stale_connections`](Self::cleanup_stale_connections)
	/// every `interval` until `shutdown` is cancelled
	///
	/// # Examples
	///
	/// ```no_run
	/// use shiftdesk_websockets::ConnectionRegistry;
	/// use std::sync::Arc;
	/// use std::time::Duration;
	/// use tokio_util::sync::CancellationToken;
	///
	/// # async fn example(registry: Arc<ConnectionRegistry>) {
	/// let shutdown = CancellationToken::new();
	/// let reaper = registry.spawn_cleanup_task(Duration::from_secs(60), shutdown.clone());
	///
	/// shutdown.cancel();
	/// reaper.await.unwrap();
	/// # }
	/// ```
	pub fn spawn_cleanup_task(
		self: &Arc<Self>,
		interval: Duration,
		shutdown: CancellationToken,
	) -> JoinHandle<()> {
		let registry = Arc::clone(self);
		let period = interval.max(Duration::from_millis(1));

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// The first tick completes immediately
			ticker.tick().await;

			loop {
				tokio::select! {
					_ = shutdown.cancelled() => {
						tracing::debug!("Connection cleanup task stopped");
						break;
					}
					_ = ticker.tick() => {
						let removed = registry.cleanup_stale_connections().await;
						tracing::debug!(removed, "Connection cleanup pass finished");
					}
				}
			}
		})
	}

	/// Websocket ids of a user across all processes
	///
	/// Reads the shared index, falling back to local connections when the
	/// store is unavailable.
	pub async fn user_connection_ids(&self, user_id: i64) -> Vec<String> {
		let mut ids: HashSet<String> = self
			.directory
			.user_connection_ids(user_id)
			.into_iter()
			.collect();
		match self.client.store().smembers(&user_key(user_id)).await {
			Ok(shared) => ids.extend(shared),
			Err(e) => {
				tracing::warn!(user_id, error = %e, "User connection lookup failed, using local connections");
			}
		}
		ids.into_iter().collect()
	}

	/// Whether the user has a connection in any process
	pub async fn is_user_connected(&self, user_id: i64) -> bool {
		!self.user_connection_ids(user_id).await.is_empty()
	}

	pub fn local_connection_count(&self) -> usize {
		self.directory.len()
	}

	async fn scan_descriptors(&self) -> Result<Vec<ConnectionDescriptor>, StoreError> {
		let store = self.client.store();
		let keys = store
			.scan_match(&format!("{}*", CONNECTION_KEY_PREFIX))
			.await?;

		let mut descriptors = Vec::with_capacity(keys.len());
		for key in keys {
			let fields = store.hgetall(&key).await?;
			if let Ok(descriptor) = ConnectionDescriptor::from_fields(&fields) {
				descriptors.push(descriptor);
			}
		}
		Ok(descriptors)
	}
}
