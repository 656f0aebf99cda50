//! Connection registry integration tests
//!
//! # Test Categories
//!
//! - Registration: session checks, store mirroring, unregister
//! - Fan-out: per user, managers, broadcast, failed deliveries
//! - Heartbeats and stale cleanup, including the background reaper
//! - Store outages and multiple processes sharing one store

use chrono::Utc;
use rstest::*;
use shiftdesk_conf::{RealtimeSettings, SessionSettings};
use shiftdesk_sessions::{SessionManager, UserData};
use shiftdesk_store::{InMemoryStore, KeyValueStore, RetryPolicy, StoreClient};
use shiftdesk_websockets::{ConnectionRegistry, Message, WebSocketConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Fixtures
// =============================================================================

struct Harness {
	store: InMemoryStore,
	sessions: Arc<SessionManager>,
	registry: Arc<ConnectionRegistry>,
}

impl Harness {
	/// A second registry on the same store, as another process would have
	fn peer(&self) -> ConnectionRegistry {
		ConnectionRegistry::new(client(&self.store), self.sessions.clone(), &realtime())
	}

	async fn login(&self, user: &UserData) -> String {
		let (session_id, _csrf) = self
			.sessions
			.create_secure_session(user, None)
			.await
			.expect("Session creation should succeed");
		session_id
	}

	async fn connect(
		&self,
		websocket_id: &str,
		user: &UserData,
	) -> UnboundedReceiver<Message> {
		let session_id = self.login(user).await;
		let (socket, rx) = WebSocketConnection::channel(websocket_id);
		assert!(
			self.registry
				.register_connection(Arc::new(socket), websocket_id, &session_id, user)
				.await
		);
		rx
	}

	/// Rewind a mirrored heartbeat so the descriptor looks stale
	async fn age_heartbeat(&self, websocket_id: &str, secs: i64) {
		let old = Utc::now() - chrono::Duration::seconds(secs);
		self.store
			.hset(
				&format!("ws:connection:{}", websocket_id),
				"last_heartbeat",
				&old.to_rfc3339(),
			)
			.await
			.unwrap();
	}
}

fn client(store: &InMemoryStore) -> StoreClient {
	StoreClient::from_store(
		Arc::new(store.clone()),
		RetryPolicy::default().with_base_delay(Duration::from_millis(1)),
	)
}

fn realtime() -> RealtimeSettings {
	let mut settings = RealtimeSettings::default();
	settings.stale_threshold_secs = 60;
	settings
}

#[fixture]
fn harness() -> Harness {
	let store = InMemoryStore::new();
	let mut session_settings = SessionSettings::default();
	session_settings.secret_key = "test-secret-key-that-is-long-enough-for-tests".to_string();
	let sessions = Arc::new(SessionManager::new(client(&store), session_settings));
	let registry = Arc::new(ConnectionRegistry::new(
		client(&store),
		sessions.clone(),
		&realtime(),
	));
	Harness {
		store,
		sessions,
		registry,
	}
}

#[fixture]
fn worker() -> UserData {
	UserData::new(7, "dana")
}

#[fixture]
fn manager() -> UserData {
	UserData::new(42, "alice").with_manager(true)
}

fn text(rx: &mut UnboundedReceiver<Message>) -> Option<String> {
	match rx.try_recv().ok()? {
		Message::Text { data } => Some(data),
		_ => None,
	}
}

// =============================================================================
// Registration Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_register_mirrors_descriptor(harness: Harness, worker: UserData) {
	// Act
	let _rx = harness.connect("ws-1", &worker).await;

	// Assert
	let fields = harness.store.hgetall("ws:connection:ws-1").await.unwrap();
	assert_eq!(fields.get("user_id").map(String::as_str), Some("7"));
	assert_eq!(fields.get("username").map(String::as_str), Some("dana"));
	assert_eq!(fields.get("is_manager").map(String::as_str), Some("false"));
	assert_eq!(
		harness.store.smembers("ws:user:7").await.unwrap(),
		vec!["ws-1".to_string()]
	);

	let ttl = harness.store.ttl("ws:connection:ws-1").unwrap();
	assert!(ttl > Duration::from_secs(110) && ttl <= Duration::from_secs(120));
	assert!(harness.store.ttl("ws:user:7").is_some());

	assert!(harness.registry.is_user_connected(7).await);
	assert_eq!(harness.registry.metrics().snapshot().active_connections, 1);
}

#[rstest]
#[tokio::test]
async fn test_invalid_session_leaves_no_trace(harness: Harness, worker: UserData) {
	// Arrange
	let (socket, _rx) = WebSocketConnection::channel("ws-1");

	// Act
	let registered = harness
		.registry
		.register_connection(Arc::new(socket), "ws-1", "no-such-session", &worker)
		.await;

	// Assert
	assert!(!registered);
	assert_eq!(harness.registry.local_connection_count(), 0);
	assert!(!harness.store.exists("ws:connection:ws-1").await.unwrap());
	assert!(!harness.registry.is_user_connected(7).await);
	assert_eq!(harness.registry.metrics().snapshot().total_connections, 0);
}

#[rstest]
#[tokio::test]
async fn test_session_of_another_user_is_rejected(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange
	let managers_session = harness.login(&manager).await;
	let (socket, _rx) = WebSocketConnection::channel("ws-1");

	// Act
	let registered = harness
		.registry
		.register_connection(Arc::new(socket), "ws-1", &managers_session, &worker)
		.await;

	// Assert
	assert!(!registered);
	assert_eq!(harness.registry.local_connection_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_unregister_removes_everything(harness: Harness, worker: UserData) {
	// Arrange
	let mut rx = harness.connect("ws-1", &worker).await;
	assert_eq!(
		harness.registry.send_to_user(7, &Message::text("hello")).await,
		1
	);
	assert_eq!(text(&mut rx).as_deref(), Some("hello"));

	// Act
	assert!(harness.registry.unregister_connection("ws-1").await);

	// Assert
	assert_eq!(
		harness.registry.send_to_user(7, &Message::text("again")).await,
		0
	);
	assert!(!harness.store.exists("ws:connection:ws-1").await.unwrap());
	assert!(!harness.store.exists("ws:user:7").await.unwrap());
	assert!(!harness.registry.unregister_connection("ws-1").await);

	let snapshot = harness.registry.metrics().snapshot();
	assert_eq!(snapshot.active_connections, 0);
	assert_eq!(snapshot.disconnections, 1);
}

// =============================================================================
// Fan-out Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_send_to_user_reaches_every_socket(harness: Harness, worker: UserData) {
	// Arrange
	let mut phone = harness.connect("ws-phone", &worker).await;
	let mut laptop = harness.connect("ws-laptop", &worker).await;

	// Act
	let delivered = harness
		.registry
		.send_to_user(7, &Message::text("shift assigned"))
		.await;

	// Assert
	assert_eq!(delivered, 2);
	assert_eq!(text(&mut phone).as_deref(), Some("shift assigned"));
	assert_eq!(text(&mut laptop).as_deref(), Some("shift assigned"));
	assert_eq!(harness.registry.send_to_user(99, &Message::Ping).await, 0);
}

#[rstest]
#[tokio::test]
async fn test_send_to_managers_skips_workers(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange
	let mut worker_rx = harness.connect("ws-worker", &worker).await;
	let mut manager_rx = harness.connect("ws-manager", &manager).await;

	// Act
	let delivered = harness
		.registry
		.send_to_managers(&Message::text("timesheet submitted"))
		.await;

	// Assert
	assert_eq!(delivered, 1);
	assert_eq!(text(&mut manager_rx).as_deref(), Some("timesheet submitted"));
	assert!(worker_rx.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn test_broadcast_reaches_everyone(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange
	let mut worker_rx = harness.connect("ws-worker", &worker).await;
	let mut manager_rx = harness.connect("ws-manager", &manager).await;

	// Act
	let delivered = harness
		.registry
		.broadcast_to_all(&Message::text("maintenance at 22:00"))
		.await;

	// Assert
	assert_eq!(delivered, 2);
	assert!(text(&mut worker_rx).is_some());
	assert!(text(&mut manager_rx).is_some());
	assert_eq!(harness.registry.metrics().snapshot().messages_sent, 2);
}

#[rstest]
#[tokio::test]
async fn test_failed_delivery_unregisters_socket(harness: Harness, worker: UserData) {
	// Arrange
	let rx = harness.connect("ws-1", &worker).await;
	drop(rx);

	// Act
	let delivered = harness.registry.send_to_user(7, &Message::text("hi")).await;

	// Assert
	assert_eq!(delivered, 0);
	assert_eq!(harness.registry.local_connection_count(), 0);
	assert!(!harness.store.exists("ws:connection:ws-1").await.unwrap());

	let snapshot = harness.registry.metrics().snapshot();
	assert_eq!(snapshot.delivery_failures, 1);
	assert_eq!(snapshot.active_connections, 0);
}

#[rstest]
#[tokio::test]
async fn test_remote_sockets_are_visible_but_not_delivered(
	harness: Harness,
	worker: UserData,
) {
	// Arrange
	let _rx = harness.connect("ws-1", &worker).await;
	let peer = harness.peer();

	// Act
	let delivered = peer.send_to_user(7, &Message::text("hi")).await;

	// Assert
	assert_eq!(delivered, 0);
	assert!(peer.is_user_connected(7).await);
	assert_eq!(peer.user_connection_ids(7).await, vec!["ws-1".to_string()]);
	assert_eq!(peer.local_connection_count(), 0);
}

#[rstest]
#[tokio::test]
async fn test_reused_websocket_id_never_crosses_users(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange: another process holds "ws-1" for a worker, then this one
	// registers its own "ws-1" for a manager
	let peer = harness.peer();
	let worker_session = harness.login(&worker).await;
	let (worker_socket, mut worker_rx) = WebSocketConnection::channel("ws-1");
	assert!(
		peer.register_connection(Arc::new(worker_socket), "ws-1", &worker_session, &worker)
			.await
	);
	let mut manager_rx = harness.connect("ws-1", &manager).await;

	// Act
	let to_manager = peer
		.send_to_user(42, &Message::text("manager-only"))
		.await;
	let to_managers = peer
		.send_to_managers(&Message::text("managers-only"))
		.await;

	// Assert
	assert_eq!(to_manager, 0);
	assert_eq!(to_managers, 0);
	assert!(worker_rx.try_recv().is_err());
	assert_eq!(peer.local_connection_count(), 1);

	assert_eq!(
		harness
			.registry
			.send_to_user(42, &Message::text("manager-only"))
			.await,
		1
	);
	assert_eq!(text(&mut manager_rx).as_deref(), Some("manager-only"));
	assert_eq!(
		peer.send_to_user(7, &Message::text("worker")).await,
		1
	);
	assert_eq!(text(&mut worker_rx).as_deref(), Some("worker"));
}

// =============================================================================
// Heartbeat and Cleanup Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_heartbeat_refreshes_store_descriptor(harness: Harness, worker: UserData) {
	// Arrange
	let _rx = harness.connect("ws-1", &worker).await;
	harness.age_heartbeat("ws-1", 600).await;

	// Act
	assert!(harness.registry.update_heartbeat("ws-1").await);

	// Assert
	assert_eq!(harness.registry.cleanup_stale_connections().await, 0);
	assert_eq!(harness.registry.local_connection_count(), 1);
	assert!(!harness.registry.update_heartbeat("unknown").await);
}

#[rstest]
#[tokio::test]
async fn test_heartbeat_for_connection_held_elsewhere(harness: Harness, worker: UserData) {
	// Arrange
	let _rx = harness.connect("ws-1", &worker).await;
	harness.age_heartbeat("ws-1", 600).await;
	let peer = harness.peer();

	// Act
	assert!(peer.update_heartbeat("ws-1").await);

	// Assert
	assert_eq!(peer.cleanup_stale_connections().await, 0);
	assert!(harness.store.exists("ws:connection:ws-1").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_cleanup_removes_only_stale_connections(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange
	let _fresh = harness.connect("ws-fresh", &manager).await;
	let _stale = harness.connect("ws-stale", &worker).await;
	harness.age_heartbeat("ws-stale", 61).await;

	// Act
	let removed = harness.registry.cleanup_stale_connections().await;

	// Assert
	assert_eq!(removed, 1);
	assert!(harness.registry.directory().contains("ws-fresh"));
	assert!(!harness.registry.directory().contains("ws-stale"));
	assert!(!harness.store.exists("ws:connection:ws-stale").await.unwrap());
	assert!(!harness.registry.is_user_connected(7).await);
	assert_eq!(harness.registry.metrics().snapshot().stale_reaped, 1);
}

#[rstest]
#[tokio::test]
async fn test_cleanup_removes_malformed_descriptor(harness: Harness) {
	// Arrange
	harness
		.store
		.hset("ws:connection:ws-bad", "user_id", "not-a-number")
		.await
		.unwrap();

	// Act
	let removed = harness.registry.cleanup_stale_connections().await;

	// Assert
	assert_eq!(removed, 1);
	assert!(!harness.store.exists("ws:connection:ws-bad").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn test_cleanup_task_reaps_and_stops_on_cancel(harness: Harness, worker: UserData) {
	// Arrange
	let _rx = harness.connect("ws-1", &worker).await;
	harness.age_heartbeat("ws-1", 600).await;
	let shutdown = CancellationToken::new();

	// Act
	let reaper = harness
		.registry
		.spawn_cleanup_task(Duration::from_millis(10), shutdown.clone());
	for _ in 0..100 {
		if harness.registry.local_connection_count() == 0 {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	shutdown.cancel();

	// Assert
	assert_eq!(harness.registry.local_connection_count(), 0);
	tokio::time::timeout(Duration::from_secs(5), reaper)
		.await
		.expect("Reaper should stop after cancellation")
		.expect("Reaper should not panic");
}

// =============================================================================
// Store Outage Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_local_delivery_survives_store_outage(
	harness: Harness,
	worker: UserData,
	manager: UserData,
) {
	// Arrange
	let mut worker_rx = harness.connect("ws-worker", &worker).await;
	let mut manager_rx = harness.connect("ws-manager", &manager).await;
	harness.store.set_unavailable(true);

	// Act
	let to_user = harness.registry.send_to_user(7, &Message::text("a")).await;
	let to_managers = harness.registry.send_to_managers(&Message::text("b")).await;

	// Assert
	assert_eq!(to_user, 1);
	assert_eq!(to_managers, 1);
	assert_eq!(text(&mut worker_rx).as_deref(), Some("a"));
	assert_eq!(text(&mut manager_rx).as_deref(), Some("b"));

	// Heartbeats and cleanup degrade to local state
	assert!(harness.registry.update_heartbeat("ws-worker").await);
	assert_eq!(harness.registry.cleanup_stale_connections().await, 0);
	assert!(harness.registry.unregister_connection("ws-worker").await);
	assert_eq!(harness.registry.local_connection_count(), 1);
}
