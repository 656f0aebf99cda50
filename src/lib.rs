//! # shiftdesk
//!
//! Session, cache and realtime-connection services for the shiftdesk
//! workforce-scheduling backend.
//!
//! All three services share one key-value store (Redis in production):
//!
//! - **Sessions** ([`sessions`]): login sessions bound to CSRF tokens, with
//!   sliding expiry and per-user invalidation
//! - **Cache** ([`cache`]): cache-aside lookups with deterministic keys,
//!   per-category TTLs and pattern invalidation
//! - **Realtime** ([`websockets`]): which users hold live sockets, with
//!   targeted and broadcast delivery and a heartbeat reaper
//!
//! ## Quick Start
//!
//! ```no_run
//! use shiftdesk::{Services, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     shiftdesk::logging::init(&settings.logging);
//!
//!     let services = Services::start(settings).await?;
//!     // hand `services` (or its Arc'd parts) to request handlers
//!
//!     services.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `redis-tests` - run the Redis-backed integration tests (requires Docker)

pub mod logging;

pub use shiftdesk_cache as cache;
pub use shiftdesk_conf as conf;
pub use shiftdesk_sessions as sessions;
pub use shiftdesk_store as store;
pub use shiftdesk_websockets as websockets;

pub use shiftdesk_cache::{CacheKey, Memoized, SmartCache};
pub use shiftdesk_conf::{Settings, SettingsError};
pub use shiftdesk_sessions::{SessionError, SessionManager, SessionRecord, UserData};
pub use shiftdesk_store::{InMemoryStore, KeyValueStore, RetryPolicy, StoreClient, StoreError};
pub use shiftdesk_websockets::{ConnectionRegistry, Message, WebSocketConnection};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Startup failures
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid settings: {0}")]
	Settings(#[from] SettingsError),
	#[error("Store unavailable at startup: {0}")]
	Store(#[from] StoreError),
}

/// The process-wide service set
///
/// Built once at startup and shared with handlers by reference or through
/// its `Arc`'d parts.
pub struct Services {
	settings: Settings,
	store: StoreClient,
	sessions: Arc<SessionManager>,
	cache: Arc<SmartCache>,
	registry: Arc<ConnectionRegistry>,
	shutdown: CancellationToken,
	reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Services {
	/// Connect to the configured store and start every service
	pub async fn start(settings: Settings) -> Result<Self, ServiceError> {
		settings.validate()?;
		let store = StoreClient::connect(&settings.store).await?;
		Ok(Self::assemble(settings, store))
	}

	/// Start every service over an existing store
	///
	/// Must be called within a tokio runtime; the reaper task is spawned here.
	///
	/// # Examples
	///
	/// ```
	/// use shiftdesk::{InMemoryStore, Services, Settings};
	/// use std::sync::Arc;
	///
	/// # #[tokio::main]
	/// # async fn main() {
	/// let mut settings = Settings::default();
	/// settings.debug = true;
	///
	/// let services = Services::with_store(settings, Arc::new(InMemoryStore::new())).unwrap();
	/// assert_eq!(services.store().backend_name(), "memory");
	/// services.shutdown().await;
	/// # }
	/// ```
	pub fn with_store(
		settings: Settings,
		store: Arc<dyn KeyValueStore>,
	) -> Result<Self, ServiceError> {
		settings.validate()?;
		let client = StoreClient::from_store(store, RetryPolicy::from_settings(&settings.store.retry));
		Ok(Self::assemble(settings, client))
	}

	fn assemble(settings: Settings, store: StoreClient) -> Self {
		let sessions = Arc::new(SessionManager::new(store.clone(), settings.session.clone()));
		let cache = Arc::new(SmartCache::new(store.clone(), settings.cache.clone()));
		let registry = Arc::new(ConnectionRegistry::new(
			store.clone(),
			sessions.clone(),
			&settings.realtime,
		));

		let shutdown = CancellationToken::new();
		let reaper =
			registry.spawn_cleanup_task(settings.realtime.cleanup_interval(), shutdown.clone());

		tracing::info!(
			backend = store.backend_name(),
			cleanup_interval_secs = settings.realtime.cleanup_interval_secs,
			"Services started"
		);

		Self {
			settings,
			store,
			sessions,
			cache,
			registry,
			shutdown,
			reaper: Mutex::new(Some(reaper)),
		}
	}

	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	pub fn store(&self) -> &StoreClient {
		&self.store
	}

	pub fn sessions(&self) -> &Arc<SessionManager> {
		&self.sessions
	}

	pub fn cache(&self) -> &Arc<SmartCache> {
		&self.cache
	}

	pub fn registry(&self) -> &Arc<ConnectionRegistry> {
		&self.registry
	}

	/// Whether [`shutdown`](Self::shutdown) has been requested
	pub fn is_shutting_down(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Stop background tasks, wait for them to finish, and close the pool
	pub async fn shutdown(&self) {
		self.shutdown.cancel();
		let reaper = self.reaper.lock().await.take();
		if let Some(reaper) = reaper
			&& let Err(e) = reaper.await
		{
			tracing::error!(error = %e, "Connection cleanup task ended abnormally");
		}
		self.store.close();
		tracing::info!("Services stopped");
	}
}
